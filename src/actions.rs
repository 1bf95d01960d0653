//! Database actions on users and their linked accounts.

use chrono::Utc;
use entity::{
    account,
    sea_orm_active_enums::{Plan, UserRole},
    user,
};
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use ulid::Ulid;
use uuid::Uuid;

use crate::providers::{Profile, TokenSet};

/// Fields of a user created on first sign in.
#[derive(Debug, Clone, Default)]
pub(crate) struct NewUser {
    pub(crate) name: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) image: Option<String>,
}

pub(crate) async fn find_user(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find_by_id(id).one(db).await
}

pub(crate) async fn find_user_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
}

/// Look up the user a Stripe customer id was issued for.
pub(crate) async fn find_user_by_customer(
    db: &DatabaseConnection,
    stripe_customer_id: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::StripeCustomerId.eq(stripe_customer_id))
        .one(db)
        .await
}

/// Returns the number of rows written.
pub(crate) async fn set_plan(
    db: &DatabaseConnection,
    user_id: Uuid,
    plan: Plan,
) -> Result<u64, DbErr> {
    let result = user::Entity::update_many()
        .col_expr(user::Column::Plan, Expr::value(plan.to_value()))
        .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub(crate) async fn mark_email_verified<C>(db: &C, user_id: Uuid) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    user::Entity::update_many()
        .col_expr(user::Column::EmailVerified, Expr::value(Utc::now()))
        .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

pub(crate) async fn create_user<C>(db: &C, new_user: NewUser) -> Result<user::Model, DbErr>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::from(Ulid::new())),
        name: Set(new_user.name),
        email: Set(new_user.email),
        email_verified: Set(None),
        image: Set(new_user.image),
        role: Set(UserRole::default()),
        plan: Set(Plan::default()),
        stripe_customer_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
}

/// A failed insert is checked against the email again, since a concurrent sign in may have created the user.
pub(crate) async fn find_user_by_email_or_create(
    db: &DatabaseConnection,
    email: &str,
) -> Result<user::Model, DbErr> {
    if let Some(user) = find_user_by_email(db, email).await? {
        return Ok(user);
    }

    let new_user = NewUser {
        email: Some(email.to_owned()),
        ..Default::default()
    };
    match create_user(db, new_user).await {
        Ok(user) => Ok(user),
        Err(e) => match find_user_by_email(db, email).await? {
            Some(user) => {
                tracing::debug!(user_id = %user.id, "user was created concurrently");
                Ok(user)
            }
            None => Err(e),
        },
    }
}

pub(crate) async fn find_account(
    db: &DatabaseConnection,
    provider: &str,
    provider_account_id: &str,
) -> Result<Option<account::Model>, DbErr> {
    account::Entity::find()
        .filter(account::Column::Provider.eq(provider))
        .filter(account::Column::ProviderAccountId.eq(provider_account_id))
        .one(db)
        .await
}

/// Link an OAuth identity to `user_id`.
///
/// Linking counts as proof of the address, so the user's email is marked verified.
pub(crate) async fn link_account<C>(
    db: &C,
    user_id: Uuid,
    provider: &str,
    profile: &Profile,
    tokens: &TokenSet,
) -> Result<account::Model, DbErr>
where
    C: ConnectionTrait,
{
    let account = account::ActiveModel {
        id: Set(Uuid::from(Ulid::new())),
        user_id: Set(user_id),
        account_type: Set("oauth".to_owned()),
        provider: Set(provider.to_owned()),
        provider_account_id: Set(profile.id.clone()),
        access_token: Set(Some(tokens.access_token.clone())),
        refresh_token: Set(tokens.refresh_token.clone()),
        expires_at: Set(tokens
            .expires_in
            .map(|secs| Utc::now().timestamp() + secs)),
        token_type: Set(tokens.token_type.clone()),
        scope: Set(tokens.scope.clone()),
        id_token: Set(tokens.id_token.clone()),
    }
    .insert(db)
    .await?;

    mark_email_verified(db, user_id).await?;
    tracing::info!(%user_id, provider, "linked account");

    Ok(account)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    pub(crate) fn user_model(stripe_customer_id: Option<&str>) -> user::Model {
        let now = Utc::now();
        user::Model {
            id: Uuid::from(Ulid::new()),
            name: Some("Ada".to_owned()),
            email: Some("ada@example.com".to_owned()),
            email_verified: None,
            image: None,
            role: UserRole::Writer,
            plan: Plan::Free,
            stripe_customer_id: stripe_customer_id.map(str::to_owned),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn set_plan_reports_rows_written() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let written = set_plan(&db, Uuid::from(Ulid::new()), Plan::Master)
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn existing_email_is_not_recreated() {
        let existing = user_model(None);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![existing.clone()]])
            .into_connection();

        let user = find_user_by_email_or_create(&db, "ada@example.com")
            .await
            .unwrap();
        assert_eq!(user, existing);
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creation_falls_back_to_the_stored_user() {
        let existing = user_model(None);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![
                Vec::<user::Model>::new(),
                // the insert returns no row
                Vec::<user::Model>::new(),
                vec![existing.clone()],
            ])
            .into_connection();

        let user = find_user_by_email_or_create(&db, "ada@example.com")
            .await
            .unwrap();
        assert_eq!(user, existing);
        // lookup, failed insert, lookup again
        assert_eq!(db.into_transaction_log().len(), 3);
    }

    #[tokio::test]
    async fn insert_error_surfaces_when_no_user_appeared() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![
                Vec::<user::Model>::new(),
                Vec::<user::Model>::new(),
                Vec::<user::Model>::new(),
            ])
            .into_connection();

        assert!(find_user_by_email_or_create(&db, "ada@example.com")
            .await
            .is_err());
    }
}
