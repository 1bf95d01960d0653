//! Handles email stuff.

use lettre::{
    message::Mailbox, transport::smtp::response::Response, AsyncSmtpTransport, AsyncTransport,
    Message, Tokio1Executor,
};

use crate::constants::VERIFY_EXPIRY_SECONDS;
use crate::error::ServerError;

/// Sends the one-time sign in link for the email flow.
pub(crate) async fn send_magic_link(
    mailsender: &AsyncSmtpTransport<Tokio1Executor>,
    from: &Mailbox,
    email: &str,
    host: &str,
    url: &str,
) -> Result<Response, ServerError> {
    let mail = Message::builder()
        .from(from.clone())
        .to(email.parse()?)
        .subject(format!("Sign in to {}", host))
        .body(magic_link_body(host, url))?;

    Ok(mailsender.send(mail).await?)
}

fn magic_link_body(host: &str, url: &str) -> String {
    format!(
        "Sign in to {host}\n\n{url}\n\nThis link can only be used once and expires in {hours} hours. \
         If you did not request this email you can safely ignore it.\n",
        host = host,
        url = url,
        hours = VERIFY_EXPIRY_SECONDS / 3600,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_link_and_expiry() {
        let body = magic_link_body("localhost:3000", "http://localhost:3000/api/auth/callback/email?token=abc");
        assert!(body.contains("http://localhost:3000/api/auth/callback/email?token=abc"));
        assert!(body.contains("expires in 24 hours"));
    }
}
