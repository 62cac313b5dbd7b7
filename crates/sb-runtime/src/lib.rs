mod engine;
mod evaluator;
mod helpers;
mod host;
mod records;

pub use engine::{ErrorDisposition, FlowEngine, FlowEngineOptions};
pub use evaluator::{ExpressionEvaluator, RhaiEvaluator};
pub use host::{CommandHost, HostContext};
pub use records::{JsonRecordReader, RecordReader, XmlRecordReader};
