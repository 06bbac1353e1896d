//! 护栏层：工具调用前的授权链与调用后的结果净化链

pub mod domain_validator;
pub mod input_validator;
pub mod pii_redactor;
pub mod post_execution;
pub mod pre_execution;

pub use domain_validator::{domain_matches, extract_host, DomainValidator};
pub use input_validator::InputValidator;
pub use pii_redactor::{PiiRedactor, RedactionCounts};
pub use post_execution::{PostExecutionHook, ResultTransform};
pub use pre_execution::{GuardrailRejection, GuardrailStage, PreExecutionCheck, PreExecutionHook};
