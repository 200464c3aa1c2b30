//! Interactive confirmation before destructive steps.
use dialoguer::Confirm;

use crate::error::UsageError;

/// Source of yes/no answers.
#[cfg_attr(test, mockall::automock)]
pub trait Prompt: Send + Sync {
    /// Ask `question`; `true` means the user agreed.
    fn confirm(&self, question: &str) -> bool;
}

/// Terminal prompt. Anything but an explicit "yes", including a closed
/// terminal, counts as "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerPrompt;

impl Prompt for DialoguerPrompt {
    fn confirm(&self, question: &str) -> bool {
        Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// Ask `question` unless `force` is set.
///
/// # Errors
///
/// Returns [`UsageError::Declined`] when the user answers "no".
pub fn confirm_or_abort(prompt: &dyn Prompt, force: bool, question: &str) -> Result<(), UsageError> {
    if force || prompt.confirm(question) {
        Ok(())
    } else {
        Err(UsageError::Declined)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn force_skips_the_question() {
        let mut prompt = MockPrompt::new();
        prompt.expect_confirm().never();
        confirm_or_abort(&prompt, true, "Format /dev/sdb1?").unwrap();
    }

    #[test]
    fn yes_continues() {
        let mut prompt = MockPrompt::new();
        prompt
            .expect_confirm()
            .withf(|q| q == "Format /dev/sdb1?")
            .times(1)
            .return_const(true);
        confirm_or_abort(&prompt, false, "Format /dev/sdb1?").unwrap();
    }

    #[test]
    fn no_aborts() {
        let mut prompt = MockPrompt::new();
        prompt.expect_confirm().times(1).return_const(false);
        let err = confirm_or_abort(&prompt, false, "Format /dev/sdb1?").unwrap_err();
        assert!(matches!(err, UsageError::Declined));
    }
}
