use crate::config::build_config;
use crate::progress::Progress;
use crate::stack::Stack;
use eyre::{bail, WrapErr};
use std::time::Instant;

/// Where a stack status leaves a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    InProgress,
    Succeeded,
    Failed,
}

impl Phase {
    /// Rollbacks count as failures, the requested change was not applied
    pub(crate) fn of(status: &str) -> Self {
        match status {
            s if s.ends_with("_IN_PROGRESS") => Phase::InProgress,
            "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "DELETE_COMPLETE" | "IMPORT_COMPLETE" => {
                Phase::Succeeded
            }
            _ => Phase::Failed,
        }
    }
}

impl Stack {
    /// Poll the stack until it leaves the in-progress states
    ///
    /// Returns the final status, None when the stack is gone.
    pub(crate) async fn wait(&self, progress: &Progress) -> eyre::Result<Option<String>> {
        let config = build_config();
        let started = Instant::now();

        loop {
            let status = self
                .describe()
                .await?
                .and_then(|stack| stack.stack_status().map(|s| s.as_str().to_string()));

            let Some(status) = status else {
                return Ok(None);
            };

            log::debug!("Stack {} is {status}", self.name);

            if Phase::of(&status) != Phase::InProgress {
                return Ok(Some(status));
            }

            progress.set_status(&status);

            if started.elapsed() > config.stack_timeout {
                bail!(
                    "Stack {} is still {status} after {} minutes",
                    self.name,
                    config.stack_timeout.as_secs() / 60
                );
            }

            tokio::time::sleep(config.poll_interval).await;
        }
    }

    /// Reasons of the latest failed resource events, most recent first
    pub(crate) async fn failure_reasons(&self) -> eyre::Result<Vec<String>> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(&self.name)
            .send()
            .await
            .wrap_err(format!("Failed to fetch events of stack {}", self.name))?;

        Ok(output
            .stack_events()
            .iter()
            .filter(|event| {
                event
                    .resource_status()
                    .is_some_and(|s| s.as_str().ends_with("_FAILED"))
            })
            .filter_map(|event| {
                let reason = event.resource_status_reason()?;
                let resource = event.logical_resource_id().unwrap_or("stack");
                Some(format!("{resource}: {reason}"))
            })
            .take(5)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases() {
        assert_eq!(Phase::of("CREATE_IN_PROGRESS"), Phase::InProgress);
        assert_eq!(
            Phase::of("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            Phase::InProgress
        );
        assert_eq!(Phase::of("CREATE_COMPLETE"), Phase::Succeeded);
        assert_eq!(Phase::of("UPDATE_COMPLETE"), Phase::Succeeded);
        assert_eq!(Phase::of("ROLLBACK_COMPLETE"), Phase::Failed);
        assert_eq!(Phase::of("UPDATE_ROLLBACK_COMPLETE"), Phase::Failed);
        assert_eq!(Phase::of("DELETE_FAILED"), Phase::Failed);
    }
}
