use anyhow::Result;
use inquire::Confirm;

use vuid_core::Validation;

/// Asks whether to write outputs despite a failed validation
pub fn confirm_failed_validation(validation: &Validation) -> Result<bool> {
    let message = format!(
        "Database had {} entries but the update has {}. Write the update anyway?",
        validation.prior_count, validation.reconciled_count
    );
    let answer = Confirm::new(&message)
        .with_default(false)
        .with_help_message("Review the warnings above before accepting")
        .prompt()?;
    Ok(answer)
}
