//! Email notifications rendered with tera and handed to an HTTP mail relay.
//! Without a relay the rendered email is only logged.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use tracing::{info, warn};

use hrdesk_core::capabilities::{CapabilityError, NotificationTemplate, Notifier};
use hrdesk_core::config::NotificationConfig;

const TEMPLATES: &[(&str, &str)] = &[
    ("welcome_email.subject", "Welcome aboard, {{ first_name }}"),
    (
        "welcome_email.body",
        "Hello {{ name }},\n\n\
         your account is ready.\n\n\
         Login: {{ login }}\n\
         Temporary password: {{ temporary_password }}\n\
         {% if job_title %}Role: {{ job_title }}\n{% endif %}\
         {% if department %}Department: {{ department }}\n{% endif %}\n\
         Please change the password when you first sign in.\n",
    ),
    ("leave_submitted.subject", "{{ requester }} requests {{ category }}"),
    (
        "leave_submitted.body",
        "Hello {{ approver }},\n\n\
         {{ requester }} requests {{ category }} for {{ dates }} ({{ days }} days).\n\
         {% if reason %}Reason: {{ reason }}\n{% endif %}\n\
         Approve or reject it from the card in your chat.\n\
         Request: {{ request_id }}\n",
    ),
    ("leave_decision.subject", "Your {{ category }} request was {{ status }}"),
    (
        "leave_decision.body",
        "Hello {{ requester }},\n\n\
         your {{ category }} request for {{ dates }} was {{ status }} by {{ decided_by }}.\n",
    ),
    ("meeting_booked.subject", "Invitation: {{ subject }}"),
    (
        "meeting_booked.body",
        "Hello {{ participant }},\n\n\
         {{ organizer }} booked \"{{ subject }}\" for {{ when }}.\n\
         {% if join_url %}Join: {{ join_url }}\n{% endif %}",
    ),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    template: &'static str,
    subject: &'a str,
    body: &'a str,
}

pub struct TemplateNotifier {
    templates: Tera,
    client: reqwest::Client,
    webhook_url: Option<String>,
    sender: String,
}

impl TemplateNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, tera::Error> {
        let mut templates = Tera::default();
        templates.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self {
            templates,
            client: reqwest::Client::new(),
            webhook_url: config.webhook_url.clone(),
            sender: config.sender.clone(),
        })
    }

    pub fn render(
        &self,
        template: NotificationTemplate,
        data: &Value,
    ) -> Result<RenderedEmail, CapabilityError> {
        let context = Context::from_serialize(data)
            .map_err(|error| CapabilityError::Rejected(format!("email data: {error}")))?;
        let render = |part: &str| {
            let name = format!("{}.{part}", template.as_str());
            self.templates
                .render(&name, &context)
                .map_err(|error| CapabilityError::Rejected(format!("template `{name}`: {error}")))
        };
        Ok(RenderedEmail { subject: render("subject")?, body: render("body")? })
    }
}

#[async_trait]
impl Notifier for TemplateNotifier {
    async fn send(
        &self,
        recipient: &str,
        template: NotificationTemplate,
        data: Value,
    ) -> Result<(), CapabilityError> {
        let email = self.render(template, &data)?;

        let Some(url) = self.webhook_url.as_deref() else {
            info!(
                event_name = "notify.email.logged",
                template = template.as_str(),
                recipient = %recipient,
                subject = %email.subject,
                "no mail relay configured; email not sent"
            );
            return Ok(());
        };

        let message = RelayMessage {
            from: &self.sender,
            to: recipient,
            template: template.as_str(),
            subject: &email.subject,
            body: &email.body,
        };
        let response = self
            .client
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|error| CapabilityError::unavailable("email", error.to_string()))?;

        if let Err(error) = response.error_for_status() {
            warn!(
                event_name = "notify.email.rejected",
                template = template.as_str(),
                error = %error,
                "mail relay refused the message"
            );
            return Err(CapabilityError::Rejected(error.to_string()));
        }

        info!(
            event_name = "notify.email.sent",
            template = template.as_str(),
            recipient = %recipient,
            "email handed to relay"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hrdesk_core::capabilities::{NotificationTemplate, Notifier};
    use hrdesk_core::config::NotificationConfig;
    use serde_json::json;

    use super::TemplateNotifier;

    fn notifier() -> TemplateNotifier {
        TemplateNotifier::new(&NotificationConfig {
            webhook_url: None,
            sender: "hr@example.com".to_string(),
        })
        .expect("templates compile")
    }

    #[test]
    fn welcome_email_carries_login_and_password() {
        let email = notifier()
            .render(
                NotificationTemplate::WelcomeEmail,
                &json!({
                    "name": "John Doe",
                    "first_name": "John",
                    "login": "john.doe@example.com",
                    "temporary_password": "Xy7#pq2Lm9",
                    "job_title": null,
                    "department": "Platform",
                }),
            )
            .expect("render");

        assert_eq!(email.subject, "Welcome aboard, John");
        assert!(email.body.contains("Login: john.doe@example.com"));
        assert!(email.body.contains("Temporary password: Xy7#pq2Lm9"));
        assert!(email.body.contains("Department: Platform"));
        assert!(!email.body.contains("Role:"));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result =
            notifier().render(NotificationTemplate::LeaveDecision, &json!({"requester": "Ivan"}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn without_relay_the_email_is_only_logged() {
        let sent = notifier()
            .send(
                "ivan@example.com",
                NotificationTemplate::MeetingBooked,
                json!({
                    "participant": "Ivan",
                    "organizer": "Anna",
                    "subject": "Q2 planning",
                    "when": "Thu 2026-03-05 10:00-10:30 UTC",
                    "join_url": null,
                }),
            )
            .await;
        assert!(sent.is_ok());
    }
}
