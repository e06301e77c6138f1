use crate::models::bill::ExtractedBill;
use crate::models::receipt::ReceiptAnalysis;

/// Confidence attached to every successful extraction. The collaborator
/// reports no per-field confidence, so a fixed score is recorded.
const ANALYSIS_CONFIDENCE: f64 = 0.95;

/// Line-sum disagreements below this are treated as rounding noise.
const RECHECK_TOLERANCE: f64 = 0.01;

const AI_NOTE: &str = "Arithmetic extracted and checked by the vision model.";

/// Build the persisted analysis summary from a collaborator extraction.
///
/// `has_discrepancies` carries the collaborator's own mismatch flag.
/// `total_discrepancy` is |written − computed| with absent totals treated
/// as zero. The line items are additionally re-summed here; when that sum
/// disagrees with the collaborator's computed total, an advisory
/// suggestion is appended without overriding the flag.
pub fn summarize(extracted: &ExtractedBill) -> ReceiptAnalysis {
    let written = extracted.written_total.unwrap_or(0.0);
    let computed = extracted.computed_total.unwrap_or(0.0);

    let mut suggestions = vec!["Review the extracted items and totals.".to_string()];

    let line_sum = extracted.line_item_total();
    if extracted.computed_total.is_some() && (line_sum - computed).abs() > RECHECK_TOLERANCE {
        suggestions.push(format!(
            "Independent line-item sum ({line_sum:.2}) differs from the reported computed total ({computed:.2}); verify the extraction."
        ));
    }

    ReceiptAnalysis {
        has_discrepancies: extracted.mismatch,
        total_discrepancy: (written - computed).abs(),
        confidence: ANALYSIS_CONFIDENCE,
        suggestions,
        ai_note: AI_NOTE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bill::BillItem;

    fn bill(written: Option<f64>, computed: Option<f64>, mismatch: bool) -> ExtractedBill {
        ExtractedBill { items: Vec::new(), written_total: written, computed_total: computed, mismatch }
    }

    #[test]
    fn discrepancy_is_absolute_difference() {
        let analysis = summarize(&bill(Some(250.0), Some(230.0), true));
        assert!(analysis.has_discrepancies);
        assert_eq!(analysis.total_discrepancy, 20.0);
    }

    #[test]
    fn discrepancy_absolute_in_both_directions() {
        let analysis = summarize(&bill(Some(230.0), Some(250.0), true));
        assert_eq!(analysis.total_discrepancy, 20.0);
    }

    #[test]
    fn missing_totals_treated_as_zero() {
        let analysis = summarize(&bill(None, Some(100.0), true));
        assert_eq!(analysis.total_discrepancy, 100.0);

        let analysis = summarize(&bill(None, None, false));
        assert_eq!(analysis.total_discrepancy, 0.0);
        assert!(!analysis.has_discrepancies);
    }

    #[test]
    fn collaborator_flag_is_preserved() {
        // Equal totals but the collaborator flagged a mismatch: the flag wins.
        let analysis = summarize(&bill(Some(100.0), Some(100.0), true));
        assert!(analysis.has_discrepancies);
    }

    #[test]
    fn fixed_confidence_recorded() {
        let analysis = summarize(&bill(Some(100.0), Some(100.0), false));
        assert_eq!(analysis.confidence, 0.95);
        assert!(!analysis.suggestions.is_empty());
    }

    #[test]
    fn line_sum_disagreement_appends_advisory() {
        let extracted = ExtractedBill {
            items: vec![
                BillItem { name: "Rice".into(), quantity: 2.0, price: 100.0 },
                BillItem { name: "Oil".into(), quantity: 1.0, price: 50.0 },
            ],
            written_total: Some(250.0),
            // Collaborator claims 230 but the items sum to 250.
            computed_total: Some(230.0),
            mismatch: true,
        };
        let analysis = summarize(&extracted);
        assert_eq!(analysis.suggestions.len(), 2);
        assert!(analysis.suggestions[1].contains("250.00"));
        // The flag still reflects the collaborator's verdict.
        assert!(analysis.has_discrepancies);
    }

    #[test]
    fn agreeing_line_sum_stays_quiet() {
        let extracted = ExtractedBill {
            items: vec![BillItem { name: "Dal".into(), quantity: 1.0, price: 80.0 }],
            written_total: Some(80.0),
            computed_total: Some(80.0),
            mismatch: false,
        };
        let analysis = summarize(&extracted);
        assert_eq!(analysis.suggestions.len(), 1);
    }
}
