//! Cooperative polling shared by the page implementations

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::{errors::ActionError, types::ExecCtx};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `probe` until it yields a value.
///
/// Each round checks cancellation, then the deadline, then probes. On deadline
/// the error comes from `on_timeout` so callers can report what they were
/// waiting for.
pub async fn poll_until<T, F, Fut>(
    ctx: &ExecCtx,
    on_timeout: impl Fn() -> ActionError,
    mut probe: F,
) -> Result<T, ActionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ActionError>>,
{
    loop {
        if ctx.is_cancelled() {
            return Err(ActionError::Interrupted(format!(
                "action {} cancelled",
                ctx.action_id
            )));
        }
        if ctx.is_timeout() {
            return Err(on_timeout());
        }
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        let pause = POLL_INTERVAL.min(ctx.remaining_time());
        tokio::select! {
            _ = ctx.cancel_token.cancelled() => {}
            _ = sleep(pause) => {}
        }
    }
}
