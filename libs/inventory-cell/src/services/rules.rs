use chrono::NaiveDate;

use crate::models::{
    AdjustRequest, DiscardRequest, LedgerError, LotStatus, LotView, RegisterLotRequest, ReagentLot,
    StockStatus, TransferRequest,
};

/// Checklist items that must all be confirmed before a discard.
pub const REQUIRED_DISCARD_CHECKS: [u8; 5] = [1, 2, 3, 4, 5];

/// Quantities are kept to three decimals so float noise never reaches the backend.
pub fn round_quantity(quantity: f64) -> f64 {
    (quantity * 1000.0).round() / 1000.0
}

pub fn available(lot: &ReagentLot) -> f64 {
    round_quantity((lot.current_quantity - lot.reserved_quantity).max(0.0))
}

pub fn is_past_expiry(lot: &ReagentLot, today: NaiveDate) -> bool {
    lot.expiry_date < today
}

pub fn stock_status(lot: &ReagentLot, today: NaiveDate) -> StockStatus {
    if lot.status == LotStatus::Disposed {
        return StockStatus::Disposed;
    }
    if lot.status == LotStatus::Expired || is_past_expiry(lot, today) {
        return StockStatus::Expired;
    }

    let available = available(lot);
    let minimum = lot.effective_minimum();
    if available <= minimum / 2.0 {
        StockStatus::Critical
    } else if available <= minimum {
        StockStatus::Low
    } else {
        StockStatus::Normal
    }
}

pub fn to_view(lot: ReagentLot, today: NaiveDate) -> LotView {
    LotView {
        available_quantity: available(&lot),
        stock_status: stock_status(&lot, today),
        lot,
    }
}

fn positive_quantity(quantity: f64) -> Result<f64, LedgerError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(LedgerError::ValidationError("Quantity must be greater than zero".to_string()));
    }
    Ok(round_quantity(quantity))
}

/// The lot must be active and not past its expiry date.
pub fn ensure_usable(lot: &ReagentLot, today: NaiveDate) -> Result<(), LedgerError> {
    if lot.status != LotStatus::Active {
        return Err(LedgerError::LotNotActive(lot.status));
    }
    if is_past_expiry(lot, today) {
        return Err(LedgerError::LotExpired(lot.expiry_date));
    }
    Ok(())
}

pub fn validate_registration(request: &RegisterLotRequest, today: NaiveDate) -> Result<(), LedgerError> {
    positive_quantity(request.initial_quantity)?;
    if request.lot_number.trim().is_empty() {
        return Err(LedgerError::ValidationError("Lot number is required".to_string()));
    }
    if request.location.trim().is_empty() {
        return Err(LedgerError::ValidationError("Location is required".to_string()));
    }
    if request.expiry_date < today {
        return Err(LedgerError::ValidationError("Expiry date is in the past".to_string()));
    }
    if let Some(minimum) = request.minimum_stock {
        if !minimum.is_finite() || minimum < 0.0 {
            return Err(LedgerError::ValidationError("Minimum stock must be zero or greater".to_string()));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantityChange {
    pub current: f64,
    pub reserved: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumePlan {
    pub quantity: f64,
    pub after: QuantityChange,
    pub credit_used: f64,
}

/// `credit` is what the caller's appointment already holds on this lot.
pub fn plan_consume(lot: &ReagentLot, quantity: f64, credit: f64, today: NaiveDate) -> Result<ConsumePlan, LedgerError> {
    let quantity = positive_quantity(quantity)?;
    ensure_usable(lot, today)?;

    let credit = round_quantity(credit.max(0.0).min(lot.reserved_quantity));
    let allowed = round_quantity(available(lot) + credit);
    if quantity > allowed {
        return Err(LedgerError::InsufficientStock { requested: quantity, available: allowed });
    }

    let credit_used = credit.min(quantity);
    Ok(ConsumePlan {
        quantity,
        after: QuantityChange {
            current: round_quantity(lot.current_quantity - quantity),
            reserved: round_quantity(lot.reserved_quantity - credit_used),
        },
        credit_used,
    })
}

pub fn plan_transfer(lot: &ReagentLot, request: &TransferRequest, today: NaiveDate) -> Result<QuantityChange, LedgerError> {
    let quantity = positive_quantity(request.quantity)?;
    ensure_usable(lot, today)?;

    let destination = request.to_location.trim();
    if destination.is_empty() {
        return Err(LedgerError::ValidationError("Destination location is required".to_string()));
    }
    if lot.location.as_deref().map(str::trim) == Some(destination) {
        return Err(LedgerError::ValidationError("Destination must differ from the current location".to_string()));
    }
    if request.reason.trim().is_empty() {
        return Err(LedgerError::ValidationError("Transfer reason is required".to_string()));
    }

    let available = available(lot);
    if quantity > available {
        return Err(LedgerError::InsufficientStock { requested: quantity, available });
    }

    Ok(QuantityChange {
        current: round_quantity(lot.current_quantity - quantity),
        reserved: lot.reserved_quantity,
    })
}

pub fn validate_discard(lot: &ReagentLot, request: &DiscardRequest) -> Result<(), LedgerError> {
    if !matches!(lot.status, LotStatus::Active | LotStatus::Expired) {
        return Err(LedgerError::LotNotActive(lot.status));
    }
    if request.reason.trim().is_empty() {
        return Err(LedgerError::ValidationError("Discard reason is required".to_string()));
    }

    let missing: Vec<u8> = REQUIRED_DISCARD_CHECKS.iter()
        .copied()
        .filter(|item| !request.checklist.contains(item))
        .collect();
    if !missing.is_empty() {
        return Err(LedgerError::ValidationError(format!("Checklist incomplete, missing items {:?}", missing)));
    }

    if request.photos.is_empty() {
        return Err(LedgerError::ValidationError("At least one photo of the container is required".to_string()));
    }
    if request.photos.iter().any(|photo| !photo.starts_with("data:image/")) {
        return Err(LedgerError::ValidationError("Photos must be inline data:image/... strings".to_string()));
    }

    if lot.reserved_quantity > 0.0 {
        return Err(LedgerError::ReservationsOutstanding(lot.reserved_quantity));
    }
    Ok(())
}

pub fn plan_adjust(lot: &ReagentLot, request: &AdjustRequest) -> Result<QuantityChange, LedgerError> {
    if lot.status == LotStatus::Disposed {
        return Err(LedgerError::LotNotActive(lot.status));
    }
    if !request.new_quantity.is_finite() || request.new_quantity < 0.0 {
        return Err(LedgerError::ValidationError("New quantity must be zero or greater".to_string()));
    }
    let new_quantity = round_quantity(request.new_quantity);
    if new_quantity < lot.reserved_quantity {
        return Err(LedgerError::ValidationError(format!(
            "New quantity {} is below the reserved {}",
            new_quantity, lot.reserved_quantity
        )));
    }
    if request.reason.trim().is_empty() {
        return Err(LedgerError::ValidationError("Adjustment reason is required".to_string()));
    }

    Ok(QuantityChange {
        current: new_quantity,
        reserved: lot.reserved_quantity,
    })
}

pub fn plan_reserve(lot: &ReagentLot, quantity: f64, today: NaiveDate) -> Result<QuantityChange, LedgerError> {
    let quantity = positive_quantity(quantity)?;
    ensure_usable(lot, today)?;

    let available = available(lot);
    if quantity > available {
        return Err(LedgerError::InsufficientStock { requested: quantity, available });
    }

    Ok(QuantityChange {
        current: lot.current_quantity,
        reserved: round_quantity(lot.reserved_quantity + quantity),
    })
}

/// Releases never drive `reserved_quantity` below zero.
pub fn plan_release(lot: &ReagentLot, quantity: f64) -> QuantityChange {
    let released = round_quantity(quantity.max(0.0).min(lot.reserved_quantity));
    QuantityChange {
        current: lot.current_quantity,
        reserved: round_quantity(lot.reserved_quantity - released),
    }
}
