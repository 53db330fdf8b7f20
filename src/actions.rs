//! Transfer actions shared by the list and detail pages.
//!
//! An action is offered only when the status table allows it for the status
//! currently on screen. The resulting status is never predicted: callers
//! re-fetch after a successful action.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::TransferApi;
use crate::error::TransferError;
use crate::models::{ActionOutcome, TransferAction, TransferStatus};
use crate::notify::Notifier;

/// Await `fut` unless the page is torn down first. A response that arrives
/// after teardown is dropped.
pub(crate) async fn until_teardown<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> Result<F::Output, TransferError> {
    tokio::select! {
        _ = token.cancelled() => Err(TransferError::Detached),
        out = fut => {
            if token.is_cancelled() {
                Err(TransferError::Detached)
            } else {
                Ok(out)
            }
        }
    }
}

pub(crate) fn ensure_allowed(
    status: TransferStatus,
    action: TransferAction,
) -> Result<(), TransferError> {
    if status.allows(action) {
        Ok(())
    } else {
        Err(TransferError::ActionNotAllowed { action, status })
    }
}

/// Run approve/reject/delete against transfer `id` as displayed with
/// `status`. Receive goes through the receive form instead.
pub async fn run_action<A: TransferApi + ?Sized>(
    api: &A,
    notifier: &Notifier,
    token: &CancellationToken,
    id: i64,
    status: TransferStatus,
    action: TransferAction,
) -> Result<ActionOutcome, TransferError> {
    if let Err(e) = ensure_allowed(status, action) {
        notifier.warning(e.to_string());
        return Err(e);
    }

    let response = match action {
        TransferAction::Approve => until_teardown(token, api.approve_transfer(id)).await?,
        TransferAction::Reject => until_teardown(token, api.reject_transfer(id)).await?,
        TransferAction::Delete => until_teardown(token, api.delete_transfer(id)).await?,
        TransferAction::Receive => return Err(TransferError::ReceiveNeedsForm { id }),
    };

    match response {
        Ok(outcome) => {
            info!(transfer_id = id, action = %action, "transfer action accepted");
            let message = outcome
                .message
                .clone()
                .unwrap_or_else(|| format!("Transfer {}", action.done_label()));
            notifier.success(message);
            Ok(outcome)
        }
        Err(e) => {
            warn!(transfer_id = id, action = %action, error = %e, "transfer action failed");
            notifier.error(format!("Failed to {action} transfer: {e}"));
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{drain, NoticeLevel};
    use crate::test_support::{transfer, FakeApi};

    #[tokio::test]
    async fn test_disallowed_action_sends_nothing() {
        let api = FakeApi::new().with_transfers(vec![transfer(1, TransferStatus::Received, vec![])]);
        let (notifier, mut rx) = Notifier::channel();
        let token = CancellationToken::new();

        let err = run_action(
            &api,
            &notifier,
            &token,
            1,
            TransferStatus::Received,
            TransferAction::Approve,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::ActionNotAllowed { .. }));
        assert!(api.calls().is_empty());
        assert_eq!(drain(&mut rx)[0].level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_receive_is_routed_to_form() {
        let api = FakeApi::new().with_transfers(vec![transfer(2, TransferStatus::Shipped, vec![])]);
        let (notifier, _rx) = Notifier::channel();
        let token = CancellationToken::new();

        let err = run_action(
            &api,
            &notifier,
            &token,
            2,
            TransferStatus::Shipped,
            TransferAction::Receive,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::ReceiveNeedsForm { id: 2 }));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_server_rejection_is_reported() {
        let api = FakeApi::new().with_transfers(vec![transfer(3, TransferStatus::Pending, vec![])]);
        api.fail_next("approve", 422, "Stok di cabang asal tidak mencukupi");
        let (notifier, mut rx) = Notifier::channel();
        let token = CancellationToken::new();

        let err = run_action(
            &api,
            &notifier,
            &token,
            3,
            TransferStatus::Pending,
            TransferAction::Approve,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Api(_)));
        assert_eq!(api.status_of(3), Some(TransferStatus::Pending));
        let notices = drain(&mut rx);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].message.contains("tidak mencukupi"));
    }

    #[tokio::test]
    async fn test_cancelled_token_drops_response() {
        let token = CancellationToken::new();
        token.cancel();
        let out = until_teardown(&token, async { 42 }).await;
        assert!(matches!(out, Err(TransferError::Detached)));
    }
}
