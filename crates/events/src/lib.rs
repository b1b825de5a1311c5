//! TellMeMo client-side event and state infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub for [`ClientEvent`]s.
//! - [`NotificationCenter`]: session-scoped notification list with
//!   read/unread tracking.
//! - [`Store`]: observable holder for a loading/data/error [`Resource`].

pub mod bus;
pub mod notifications;
pub mod store;

pub use bus::{ClientEvent, EventBus};
pub use notifications::{Notification, NotificationCenter, NotificationChange, NotificationKind};
pub use store::{Resource, Store};
