use tracing::{error, info};

use crate::config::RunConfig;
use crate::contract::Collaborators;
use crate::error::PipelineError;

/// Only verified users may upload documents. Nothing else happens before this check.
pub async fn check_permissions(
    config: &RunConfig,
    collaborators: &Collaborators<'_>,
) -> Result<(), PipelineError> {
    collaborators.report("Checking permissions...").await;
    let user = collaborators.identity.current_user().await.map_err(|e| {
        error!(error = ?e, "Failed to look up the current user");
        PipelineError::Identity(e)
    })?;

    if !user.verified {
        info!(username = %user.username, "User is not verified, stopping");
        collaborators
            .report(&format!(
                "You need to be verified to use this add-on. Please verify your account here: {}",
                config.verification_url
            ))
            .await;
        return Err(PipelineError::Unverified);
    }

    info!(username = %user.username, "User is verified");
    Ok(())
}
