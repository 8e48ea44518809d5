pub mod connector;
pub mod control;
pub mod document_worker;
pub mod handler;
pub mod process;
pub mod room;

pub use connector::{Connector, Outbound};
pub use control::serve_control;
pub use document_worker::{DocumentWorker, WorkerSettings};
pub use handler::create_worker_routes;
pub use room::Room;
