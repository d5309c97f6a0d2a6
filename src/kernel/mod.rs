// Kernel - infrastructure seams only, no business logic.
//
// Each seam (clock, job bus, pub/sub bus) is a trait with a production
// implementation and an in-memory test double, so the admission-control
// logic in `party` can be exercised without a live Postgres or Redis.

pub mod clock;
pub mod job_bus;
pub mod pubsub;
pub mod server_kernel;
pub mod sse;

pub use clock::{Clock, FixedClock, SystemClock};
pub use job_bus::{InMemoryJobBus, JobBus, RedisJobBus};
pub use pubsub::{InMemoryPubSubBus, PubSubBus, RedisPubSubBus, SharedPubSubBus};
pub use server_kernel::ServerKernel;
