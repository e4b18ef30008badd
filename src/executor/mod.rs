//! Action execution
//!
//! [`ActionExecutor`] turns a parsed [`Action`] into DevTools input events.
//! Labels are resolved again on every call; nothing from the perception
//! cycle is cached besides the marker attributes written into the page.

mod dom_actions;

pub use dom_actions::DomActions;

use crate::{
    action::{Action, Operation},
    browser::TabHandle,
    config::AgentConfig,
    error::{AgentError, Result},
    utils::{is_relative, normalize_url, resolve_url},
};
use tokio::time::sleep;

/// What happened to an executed action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Performed,
    /// The label resolved to nothing; the page was left untouched
    TargetNotFound,
    /// `finish` and `fail` have no remote effect
    NoOp,
}

pub struct ActionExecutor<'a> {
    tab: &'a dyn TabHandle,
    config: &'a AgentConfig,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(tab: &'a dyn TabHandle, config: &'a AgentConfig) -> Self {
        Self { tab, config }
    }

    fn dom(&self) -> DomActions<'a> {
        DomActions::new(self.tab, self.config)
    }

    /// Perform `action` on the tab.
    ///
    /// A label that cannot be grounded is logged and reported as
    /// [`Execution::TargetNotFound`]; the task goes on with the next iteration.
    pub async fn execute(&self, action: &Action) -> Result<Execution> {
        log::info!("executing {}", action.operation.name());

        match self.perform(&action.operation).await {
            Err(AgentError::Grounding(reason)) => {
                log::warn!("{} skipped: {}", action.operation.name(), reason);
                Ok(Execution::TargetNotFound)
            }
            other => other,
        }
    }

    async fn perform(&self, operation: &Operation) -> Result<Execution> {
        let dom = self.dom();

        match operation {
            Operation::Click { label } => {
                let at = dom.locate(label).await?;
                dom.click_at(at).await?;
            }
            Operation::SetValue { label, value } => {
                self.set_value(label, value).await?;
            }
            Operation::SetValueAndEnter { label, value } => {
                self.set_value(label, &format!("{}\n", value)).await?;
            }
            Operation::Scroll { value } => dom.scroll(*value).await?,
            Operation::Wait => sleep(self.config.wait_duration).await,
            Operation::Navigate { url } => {
                let mut target = normalize_url(url);
                if is_relative(&target) {
                    let base = self.tab.current_url().await?;
                    target = resolve_url(&target, &base)
                        .ok_or_else(|| AgentError::Grounding(format!("cannot open `{}` relative to {}", target, base)))?;
                }
                self.tab.navigate(&target).await?;
                dom.wait_till_stable().await?;
            }
            Operation::Finish | Operation::Fail => return Ok(Execution::NoOp),
        }
        Ok(Execution::Performed)
    }

    async fn set_value(&self, label: &str, value: &str) -> Result<()> {
        let dom = self.dom();
        let at = dom.locate(label).await?;
        dom.click_at(at).await?;
        dom.select_all().await?;
        dom.type_text(value).await
    }
}
