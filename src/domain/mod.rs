//! Domain layer - pure types and computation, no IO.

pub mod customer;
pub mod foundation;
pub mod payment_method;
pub mod pricing;
pub mod webhook;
