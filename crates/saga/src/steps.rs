//! Booking saga step names, used as tracing fields and metric labels.

/// Step name: Look up the driver in the user service.
pub const VALIDATE_USER: &str = "validate_user";

/// Step name: Load the driver's membership tier.
pub const LOAD_MEMBERSHIP: &str = "load_membership";

/// Step name: Look up a promotion code.
pub const LOOKUP_PROMOTION: &str = "lookup_promotion";

/// Step name: Reserve the slot and open a pending session.
pub const RESERVE_SLOT: &str = "reserve_slot";

/// Step name: Reprice the pending session with a promotion.
pub const APPLY_PROMOTION: &str = "apply_promotion";

/// Step name: Charge the invoice total through billing.
pub const REQUEST_PAYMENT: &str = "request_payment";

/// Step name: Confirm the booking after a successful payment.
pub const CONFIRM_BOOKING: &str = "confirm_booking";

/// Step name: Refund a charge whose booking could not be confirmed.
pub const REFUND_PAYMENT: &str = "refund_payment";

/// Step name: Expire an abandoned session, releasing its slot.
pub const EXPIRE_SESSION: &str = "expire_session";
