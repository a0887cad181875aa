//! The registry decides which backends exist and which one serves a request.
//!
//! It consists of four parts, used in this order:
//!
//! - [`catalog`]: the ordered list of `(key, model)` pairs declared before startup.
//!   Declaration order is load order.
//! - [`populate`]: attempts every catalog entry once. A backend that fails to load
//!   is logged and skipped. If nothing loads, startup fails and the gateway never
//!   opens its socket.
//! - [`residency`]: the backends that loaded, kept in the order their loads
//!   completed. It is frozen before the first request and only read afterwards.
//! - [`router`]: matches a request to a resident backend. The requested key wins
//!   if it is resident, then the configured default, then the earliest resident
//!   backend. The result records which of the three applied.

pub(crate) mod catalog;
pub(crate) mod populate;
pub(crate) mod residency;
pub(crate) mod router;
