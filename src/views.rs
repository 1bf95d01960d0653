//! Server rendered pages.

use lazy_static::lazy_static;
use serde::Serialize;
use tera::{Context, Tera};

use crate::constants::ACCOUNT_NOT_LINKED;

lazy_static! {
    static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            ("sign_in.html", include_str!("../templates/sign_in.html")),
            ("verify_request.html", include_str!("../templates/verify_request.html")),
            ("error.html", include_str!("../templates/error.html")),
        ])
        .expect("embedded templates failed to parse");
        tera
    };
}

/// A provider button on the sign in page.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProviderButton {
    pub(crate) id: &'static str,
    pub(crate) name: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignInView<'a> {
    /// Banner shown above the form.
    pub(crate) error: Option<&'static str>,
    /// Previously entered email, when re-rendering after a validation failure.
    pub(crate) email: &'a str,
    pub(crate) email_error: Option<String>,
    pub(crate) callback_url: &'a str,
    pub(crate) providers: Vec<ProviderButton>,
}

/// Banner text for the `error` query parameter of the sign in page.
pub(crate) fn sign_in_error_message(code: Option<&str>) -> Option<&'static str> {
    match code {
        Some(ACCOUNT_NOT_LINKED) => {
            Some("Account not linked, email already in use with different account")
        }
        _ => None,
    }
}

/// Text of the standalone error page.
pub(crate) fn error_page_message(code: Option<&str>) -> &'static str {
    match code {
        Some("Configuration") => "There is a problem with the server configuration.",
        Some("OAuthCallback") => "Sign in with this provider did not complete. Please try again.",
        Some("Verification") => "The sign in link is no longer valid. It may have been used already or it may have expired.",
        _ => "Unable to sign in.",
    }
}

pub(crate) fn render_sign_in(view: &SignInView<'_>) -> Result<String, tera::Error> {
    TEMPLATES.render("sign_in.html", &Context::from_serialize(view)?)
}

pub(crate) fn render_verify_request(host: &str) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("host", host);
    TEMPLATES.render("verify_request.html", &context)
}

pub(crate) fn render_error(code: Option<&str>) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("message", error_page_message(code));
    TEMPLATES.render("error.html", &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(error: Option<&'static str>) -> SignInView<'static> {
        SignInView {
            error,
            email: "",
            email_error: None,
            callback_url: "/",
            providers: vec![
                ProviderButton {
                    id: "google",
                    name: "Google",
                },
                ProviderButton {
                    id: "github",
                    name: "GitHub",
                },
            ],
        }
    }

    #[test]
    fn only_account_not_linked_has_a_banner() {
        assert_eq!(
            sign_in_error_message(Some("OAuthAccountNotLinked")),
            Some("Account not linked, email already in use with different account")
        );
        assert_eq!(sign_in_error_message(Some("OAuthCallback")), None);
        assert_eq!(sign_in_error_message(None), None);
    }

    #[test]
    fn sign_in_page_lists_form_and_providers() {
        let html = render_sign_in(&view(None)).unwrap();
        assert!(html.contains(r#"action="/sign-in/email""#));
        assert!(html.contains(r#"action="/api/auth/signin/google""#));
        assert!(html.contains("Sign in with GitHub"));
        assert!(!html.contains(r#"class="alert""#));
    }

    #[test]
    fn sign_in_page_shows_banner_and_field_error() {
        let mut view = view(sign_in_error_message(Some(ACCOUNT_NOT_LINKED)));
        view.email = "not-an-email";
        view.email_error = Some("Invalid email".to_owned());

        let html = render_sign_in(&view).unwrap();
        assert!(html.contains("Account not linked"));
        assert!(html.contains("Invalid email"));
        assert!(html.contains(r#"value="not-an-email""#));
    }

    #[test]
    fn user_input_is_escaped() {
        let mut view = view(None);
        view.email = r#""><script>alert(1)</script>"#;
        let html = render_sign_in(&view).unwrap();
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn no_divider_without_providers() {
        let mut view = view(None);
        view.providers.clear();
        let html = render_sign_in(&view).unwrap();
        assert!(!html.contains(r#"class="divider""#));
    }

    #[test]
    fn error_page_falls_back_to_generic_message() {
        assert!(render_error(Some("Verification"))
            .unwrap()
            .contains("no longer valid"));
        assert!(render_error(Some("whatever"))
            .unwrap()
            .contains("Unable to sign in."));
    }
}
