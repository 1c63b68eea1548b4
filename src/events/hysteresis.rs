/// Outcome of checking one anomaly score against a raise threshold.
///
/// ```text
/// not raised, score <  threshold            → Clear   (nothing to do)
/// not raised, score >= threshold            → Raise   (open event, emit)
/// raised,     score >= threshold - margin   → Held    (still open, no emit)
/// raised,     score <  threshold - margin   → Recover (close event, emit)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HysteresisEvaluation {
    Clear,
    Raise,
    Held,
    Recover,
}

impl HysteresisEvaluation {
    pub fn evaluate(score: f64, threshold: f64, margin: f64, raised: bool) -> HysteresisEvaluation {
        if raised {
            if score < threshold - margin {
                return HysteresisEvaluation::Recover;
            }
            return HysteresisEvaluation::Held;
        }

        if score >= threshold {
            return HysteresisEvaluation::Raise;
        }

        HysteresisEvaluation::Clear
    }

    /// Whether the event is open after this evaluation.
    pub fn is_raised(self) -> bool {
        matches!(self, HysteresisEvaluation::Raise | HysteresisEvaluation::Held)
    }
}
