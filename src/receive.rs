//! Receipt confirmation for a shipped transfer.
//!
//! Each line starts at the quantity already recorded as received, or at the
//! requested quantity when nothing was recorded yet. Valid range per line is
//! `0..=requested`. All lines go to the server in one request.

use serde::Serialize;

use crate::error::{TransferError, ValidationError};
use crate::models::{ReceiveLine, TransferAction, TransferDetail};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiveLineInput {
    pub line_id: i64,
    pub code: String,
    pub name: String,
    pub requested_qty: i64,
    pub received_qty: i64,
}

impl ReceiveLineInput {
    pub fn bounds(&self) -> (i64, i64) {
        (0, self.requested_qty)
    }

    pub fn in_range(&self) -> bool {
        (0..=self.requested_qty).contains(&self.received_qty)
    }

    pub fn shortfall(&self) -> i64 {
        (self.requested_qty - self.received_qty).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiveForm {
    pub transfer_id: i64,
    pub lines: Vec<ReceiveLineInput>,
}

/// Clamp a typed value into `0..=requested`, as the input control does.
pub fn clamp_received(value: i64, requested: i64) -> i64 {
    value.clamp(0, requested.max(0))
}

impl ReceiveForm {
    /// Build the form for a transfer whose status allows receiving.
    pub fn from_detail(detail: &TransferDetail) -> Result<Self, TransferError> {
        crate::actions::ensure_allowed(detail.status(), TransferAction::Receive)?;
        let lines = detail
            .items
            .iter()
            .map(|item| ReceiveLineInput {
                line_id: item.id,
                code: item.code.clone(),
                name: item.name.clone(),
                requested_qty: item.requested_qty,
                received_qty: item.received_qty.unwrap_or(item.requested_qty),
            })
            .collect();
        Ok(Self {
            transfer_id: detail.id(),
            lines,
        })
    }

    /// Store the value as typed. Range is enforced by `validate`.
    pub fn set_received(&mut self, line_id: i64, qty: i64) -> Result<(), TransferError> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.line_id == line_id)
            .ok_or_else(|| TransferError::UnknownLine(line_id.to_string()))?;
        line.received_qty = qty;
        Ok(())
    }

    /// Pull every line back into range.
    pub fn clamp_all(&mut self) {
        for line in &mut self.lines {
            line.received_qty = clamp_received(line.received_qty, line.requested_qty);
        }
    }

    pub fn is_partial(&self) -> bool {
        self.lines.iter().any(|l| l.shortfall() > 0)
    }

    pub fn validate(&self) -> Result<Vec<ReceiveLine>, ValidationError> {
        if self.lines.is_empty() {
            return Err(ValidationError::NoItems);
        }
        self.lines
            .iter()
            .map(|line| {
                if line.in_range() {
                    Ok(ReceiveLine {
                        line_id: line.line_id,
                        received_qty: line.received_qty,
                    })
                } else {
                    Err(ValidationError::ReceivedOutOfRange {
                        code: line.code.clone(),
                        received: line.received_qty,
                        requested: line.requested_qty,
                    })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferStatus;
    use crate::test_support::{line, transfer};

    #[test]
    fn test_initial_quantities() {
        let detail = transfer(
            5,
            TransferStatus::Shipped,
            vec![line(1, "BRG-001", 5, None), line(2, "BRG-002", 5, Some(3))],
        );
        let form = ReceiveForm::from_detail(&detail).unwrap();
        assert_eq!(form.lines[0].received_qty, 5);
        assert_eq!(form.lines[1].received_qty, 3);
        assert!(form.is_partial());
    }

    #[test]
    fn test_only_shipped_transfers_open_the_form() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Approved,
            TransferStatus::Received,
            TransferStatus::Rejected,
        ] {
            let detail = transfer(5, status, vec![line(1, "BRG-001", 5, None)]);
            assert!(matches!(
                ReceiveForm::from_detail(&detail),
                Err(TransferError::ActionNotAllowed { .. })
            ));
        }
    }

    #[test]
    fn test_out_of_range_rejected_before_submit() {
        let detail = transfer(5, TransferStatus::Shipped, vec![line(1, "BRG-001", 5, None)]);
        let mut form = ReceiveForm::from_detail(&detail).unwrap();

        form.set_received(1, 6).unwrap();
        assert_eq!(
            form.validate(),
            Err(ValidationError::ReceivedOutOfRange {
                code: "BRG-001".into(),
                received: 6,
                requested: 5
            })
        );

        form.set_received(1, -1).unwrap();
        assert!(form.validate().is_err());

        form.set_received(1, 0).unwrap();
        assert_eq!(
            form.validate().unwrap(),
            vec![ReceiveLine {
                line_id: 1,
                received_qty: 0
            }]
        );
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_received(9, 5), 5);
        assert_eq!(clamp_received(-3, 5), 0);
        assert_eq!(clamp_received(2, 5), 2);

        let detail = transfer(5, TransferStatus::Shipped, vec![line(1, "BRG-001", 5, None)]);
        let mut form = ReceiveForm::from_detail(&detail).unwrap();
        form.set_received(1, 40).unwrap();
        form.clamp_all();
        assert_eq!(form.lines[0].received_qty, 5);
    }

    #[test]
    fn test_unknown_line() {
        let detail = transfer(5, TransferStatus::Shipped, vec![line(1, "BRG-001", 5, None)]);
        let mut form = ReceiveForm::from_detail(&detail).unwrap();
        assert!(matches!(
            form.set_received(99, 1),
            Err(TransferError::UnknownLine(_))
        ));
    }
}
