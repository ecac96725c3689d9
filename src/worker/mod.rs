pub mod coordinator;
pub mod protocol;
pub mod split_worker;

pub use self::coordinator::WorkerCoordinator;
pub use self::protocol::{new_request_id, RequestId, WorkerOutput, WorkerRequest, WorkerResponse};
pub use self::split_worker::{RasterWorkerRenderer, SplitWorker, WorkerRenderer};
