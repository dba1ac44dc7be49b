pub mod bus;
pub mod fanout;
pub mod listener;

pub use bus::{BusMessage, BusSubscription, EventBus, LocalEventBus, RedisEventBus};
pub use fanout::{ConnectionFanout, StreamKind};
pub use listener::run_fanout_listener;
