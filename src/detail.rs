//! Transfer detail page with the receive panel.
//!
//! Every successful action is followed by a fresh fetch of the transfer;
//! delete leaves the page. A failed fetch after an accepted action does not
//! undo the action: the page is marked stale instead.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::actions::{run_action, until_teardown};
use crate::api::TransferApi;
use crate::error::TransferError;
use crate::models::{TransferAction, TransferDetail};
use crate::notify::Notifier;
use crate::receive::ReceiveForm;

/// Where the page should go after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    Stay,
    BackToList,
    /// Receive picked from the list: show this page with the form open.
    ReceiveForm,
}

pub struct TransferDetailPage<A: TransferApi + 'static> {
    api: Arc<A>,
    notifier: Notifier,
    detail: Option<TransferDetail>,
    receive: Option<ReceiveForm>,
    stale: bool,
    teardown: CancellationToken,
}

impl<A: TransferApi + 'static> TransferDetailPage<A> {
    pub fn new(api: Arc<A>, notifier: Notifier) -> Self {
        Self {
            api,
            notifier,
            detail: None,
            receive: None,
            stale: false,
            teardown: CancellationToken::new(),
        }
    }

    /// Fetch transfer `id`. On failure the previously shown transfer stays.
    pub async fn load(&mut self, id: i64) -> Result<&TransferDetail, TransferError> {
        match until_teardown(&self.teardown, self.api.get_transfer(id)).await? {
            Ok(detail) => {
                if self.detail.as_ref().map(|d| d.id()) != Some(id) {
                    self.receive = None;
                }
                self.detail = Some(detail);
                self.stale = false;
                self.detail.as_ref().ok_or(TransferError::NothingLoaded)
            }
            Err(e) => {
                warn!(transfer_id = id, error = %e, "failed to load transfer");
                self.notifier.error(format!("Failed to load transfer: {e}"));
                Err(e.into())
            }
        }
    }

    pub fn detail(&self) -> Option<&TransferDetail> {
        self.detail.as_ref()
    }

    pub fn actions(&self) -> &'static [TransferAction] {
        self.detail
            .as_ref()
            .map(|d| d.status().allowed_actions())
            .unwrap_or(&[])
    }

    pub fn receive_form(&self) -> Option<&ReceiveForm> {
        self.receive.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Approve, reject or delete the loaded transfer.
    pub async fn perform(&mut self, action: TransferAction) -> Result<Navigation, TransferError> {
        let (id, status) = {
            let detail = self.detail.as_ref().ok_or(TransferError::NothingLoaded)?;
            (detail.id(), detail.status())
        };

        run_action(
            self.api.as_ref(),
            &self.notifier,
            &self.teardown,
            id,
            status,
            action,
        )
        .await?;

        if action == TransferAction::Delete {
            self.detail = None;
            self.receive = None;
            return Ok(Navigation::BackToList);
        }
        self.refresh_after_action(id).await;
        Ok(Navigation::Stay)
    }

    async fn refresh_after_action(&mut self, id: i64) {
        if let Err(e) = self.load(id).await {
            warn!(transfer_id = id, error = %e, "refresh after action failed");
            self.stale = true;
        }
    }

    /// Open the receive panel for the loaded transfer.
    pub fn open_receive_form(&mut self) -> Result<&mut ReceiveForm, TransferError> {
        let detail = self.detail.as_ref().ok_or(TransferError::NothingLoaded)?;
        let form = match ReceiveForm::from_detail(detail) {
            Ok(form) => form,
            Err(e) => {
                self.notifier.warning(e.to_string());
                return Err(e);
            }
        };
        Ok(self.receive.insert(form))
    }

    pub fn set_received(&mut self, line_id: i64, qty: i64) -> Result<(), TransferError> {
        let id = self.detail.as_ref().map(|d| d.id()).unwrap_or_default();
        self.receive
            .as_mut()
            .ok_or(TransferError::NotLoaded(id))?
            .set_received(line_id, qty)
    }

    /// Submit the receive panel. The form survives any failure.
    pub async fn submit_receive(&mut self) -> Result<(), TransferError> {
        let form = self.receive.as_ref().ok_or(TransferError::NothingLoaded)?;
        let transfer_id = form.transfer_id;
        let lines = match form.validate() {
            Ok(lines) => lines,
            Err(e) => {
                self.notifier.error(e.to_string());
                return Err(e.into());
            }
        };
        let partial = form.is_partial();

        let result = until_teardown(
            &self.teardown,
            self.api.receive_transfer(transfer_id, &lines),
        )
        .await?;
        match result {
            Ok(outcome) => {
                info!(transfer_id, lines = lines.len(), partial, "transfer received");
                let message = outcome.message.unwrap_or_else(|| {
                    if partial {
                        "Transfer received with shortages".to_string()
                    } else {
                        "Transfer received".to_string()
                    }
                });
                self.notifier.success(message);
                self.receive = None;
                self.refresh_after_action(transfer_id).await;
                Ok(())
            }
            Err(e) => {
                warn!(transfer_id, error = %e, "receive rejected");
                self.notifier
                    .error(format!("Failed to receive transfer: {e}"));
                Err(e.into())
            }
        }
    }

    pub fn teardown(&self) {
        self.teardown.cancel();
    }
}
