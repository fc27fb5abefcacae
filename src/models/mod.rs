pub mod evaluation;
pub mod grade;
pub mod loaders;
pub mod rubric;
pub mod submission;

pub use evaluation::{CapacityReport, GradingEvaluation};
pub use grade::{summarize, Grade, ScoreSummary};
pub use loaders::{load_all_submissions, load_rubric, load_submission};
pub use rubric::{validate_rubric, BandLevel, BandSpec, RubricItem, ScoreBand};
pub use submission::{QuestionType, SubmissionJob};
