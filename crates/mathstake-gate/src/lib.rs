/*!
# MathStake Code Safety Gate

Classifies user-submitted code (solvers, cost functions, input generators)
as `safe`, `warning` or `dangerous` before it is stored or executed.

1. **Static pass**: ordered regex rule tables ([`rules`]) plus structural
   checks (empty, oversized, missing entry point). Any dangerous finding is
   final and skips semantic review.
2. **Semantic pass**: optional [`SemanticReviewer`]; issues are unioned and
   the higher severity wins. If the reviewer fails or times out the static
   result stands.

Cost functions get an extra rule set: they must be deterministic and
identity-blind functions of `(test_input, solution_output)`.
*/

pub mod error;
pub mod gate;
pub mod reviewer;
pub mod rules;

pub use error::{GateError, Result};
pub use gate::{CodeSafetyGate, GateConfig, ValidationReport, ValidationRequest};
pub use reviewer::{ReviewVerdict, SemanticReviewer};
#[cfg(feature = "http-reviewer")]
pub use reviewer::{HttpReviewerConfig, HttpSemanticReviewer};
pub use rules::{RuleCategory, Severity};
