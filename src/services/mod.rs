pub mod evaluator;
pub mod feedback;
pub mod llm_service;
pub mod mcq_scorer;
pub mod results_writer;
pub mod rubric_source;

pub use evaluator::{EvaluationRequest, Evaluator, LlmEvaluator};
pub use feedback::{FeedbackSynthesizer, LlmFeedbackSynthesizer};
pub use llm_service::LlmService;
pub use mcq_scorer::{McqOutcome, McqScorer};
pub use results_writer::{CsvResultsWriter, ResultsWriter};
pub use rubric_source::{RubricSource, TomlRubricSource};
