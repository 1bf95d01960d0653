pub use super::account::Entity as Account;
pub use super::user::Entity as User;
