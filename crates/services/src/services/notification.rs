//! Claim-workflow emails. Delivery is best-effort: failures are logged and
//! never reach the caller.

use db::models::{agency::Agency, claim_request::ClaimRequest, profile::Profile};
use tracing::{debug, warn};

use super::email::EmailClient;

#[derive(Debug, Clone, Default)]
pub struct NotificationService {
    email: Option<EmailClient>,
    admin_email: Option<String>,
}

impl NotificationService {
    pub fn new(email: Option<EmailClient>, admin_email: Option<String>) -> Self {
        Self { email, admin_email }
    }

    /// Tells the admin inbox a new claim is waiting.
    pub async fn claim_submitted(&self, claim: &ClaimRequest, agency: &Agency, claimant: &Profile) {
        let Some(to) = self.admin_email.as_deref() else {
            debug!(claim_id = %claim.id, "no admin notification address configured");
            return;
        };
        let verified = if claim.email_domain_verified {
            "matches"
        } else {
            "does not match"
        };
        let body = format!(
            "{claimant} has requested ownership of {agency}.\n\n\
             Business email: {email} ({verified} the agency website)\n\
             Phone: {phone}\n\
             Position: {position}\n\
             Verification method: {method}\n\n\
             Claim id: {id}",
            claimant = claimant.email,
            agency = agency.name,
            email = claim.business_email,
            phone = claim.phone_number,
            position = claim.position_title,
            method = claim.verification_method,
            id = claim.id,
        );
        self.deliver(to, &format!("New claim request for {}", agency.name), &body)
            .await;
    }

    pub async fn claim_approved(&self, agency: &Agency, claimant: &Profile) {
        let body = format!(
            "Your claim for {name} has been approved. You can now edit the listing at /agencies/{slug}.",
            name = agency.name,
            slug = agency.slug,
        );
        self.deliver(
            &claimant.email,
            &format!("Your claim for {} was approved", agency.name),
            &body,
        )
        .await;
    }

    pub async fn claim_rejected(&self, claim: &ClaimRequest, agency: &Agency, claimant: &Profile) {
        let reason = claim.rejection_reason.as_deref().unwrap_or("not given");
        let body = format!(
            "Your claim for {name} was not approved.\n\nReason: {reason}\n\n\
             You may submit a new request with additional details.",
            name = agency.name,
        );
        self.deliver(
            &claimant.email,
            &format!("Update on your claim for {}", agency.name),
            &body,
        )
        .await;
    }

    async fn deliver(&self, to: &str, subject: &str, body: &str) {
        let Some(client) = &self.email else {
            debug!(subject, "email delivery disabled");
            return;
        };
        if let Err(e) = client.send(to, subject, body).await {
            warn!(subject, error = %e, "failed to send notification email");
        }
    }
}
