//! Per-question strategy selection and result budget.

use rag_core::{Strategy, StrategyChoice, TermLexicon};

/// Number of indicator terms occurring in the lower-cased question.
pub fn indicator_score(question: &str, lexicon: &TermLexicon) -> usize {
    let q = question.to_lowercase();
    lexicon
        .indicators
        .iter()
        .filter(|term| q.contains(term.as_str()))
        .count()
}

/// Result budget grown with question complexity.
///
/// Two or more indicator terms add 4, one adds 2; the result never exceeds
/// `max_k`.
pub fn dynamic_k(question: &str, base_k: usize, max_k: usize, lexicon: &TermLexicon) -> usize {
    let k = match indicator_score(question, lexicon) {
        0 => base_k,
        1 => base_k + 2,
        _ => base_k + 4,
    };
    k.min(max_k)
}

/// Pick a strategy from the question text. Numeric markers win over
/// explanatory ones.
pub fn select_strategy(question: &str, lexicon: &TermLexicon) -> Strategy {
    let q = question.to_lowercase();
    let contains_any = |terms: &[String]| terms.iter().any(|t| q.contains(t.as_str()));

    if contains_any(&lexicon.numeric) {
        Strategy::Hybrid
    } else if contains_any(&lexicon.explanatory) {
        Strategy::Diversity
    } else {
        Strategy::Similarity
    }
}

/// Resolve the caller's choice against the question.
pub fn resolve_strategy(choice: StrategyChoice, question: &str, lexicon: &TermLexicon) -> Strategy {
    match choice {
        StrategyChoice::Auto => select_strategy(question, lexicon),
        StrategyChoice::Fixed(strategy) => strategy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turkish() -> TermLexicon {
        TermLexicon::default()
    }

    #[test]
    fn test_dynamic_k_simple_question() {
        assert_eq!(dynamic_k("Daily Scrum ne kadar surer?", 6, 12, &turkish()), 6);
    }

    #[test]
    fn test_dynamic_k_grows_with_indicators() {
        let lexicon = turkish();
        assert_eq!(dynamic_k("Sprint hedefi kim belirler?", 6, 12, &lexicon), 8);
        assert_eq!(
            dynamic_k("Daily Scrum ne kadar surer ve neden yapilir?", 6, 12, &lexicon),
            10
        );
    }

    #[test]
    fn test_dynamic_k_is_capped() {
        let lexicon = turkish();
        assert_eq!(dynamic_k("neden ve nasil", 6, 7, &lexicon), 7);
        assert_eq!(dynamic_k("kim", 6, 6, &lexicon), 6);
    }

    #[test]
    fn test_dynamic_k_monotonic_in_indicators() {
        let lexicon = turkish();
        let questions = [
            "sprint planning",
            "sprint planning kim",
            "sprint planning kim ve",
            "sprint planning kim ve neden nasil hangi",
        ];
        let ks: Vec<usize> = questions
            .iter()
            .map(|q| dynamic_k(q, 6, 12, &lexicon))
            .collect();

        assert!(ks.windows(2).all(|w| w[0] <= w[1]));
        assert!(ks.iter().all(|k| *k <= 12));
    }

    #[test]
    fn test_select_strategy() {
        let lexicon = turkish();
        assert_eq!(
            select_strategy("Sprint Planning kimler tarafindan yapilir?", &lexicon),
            Strategy::Similarity
        );
        assert_eq!(
            select_strategy("Daily Scrum ne kadar surer ve neden yapilir?", &lexicon),
            Strategy::Hybrid
        );
        assert_eq!(
            select_strategy("Retrospektif neden onemlidir?", &lexicon),
            Strategy::Diversity
        );
        assert_eq!(
            select_strategy("Sprint KAC hafta olmali?", &lexicon),
            Strategy::Hybrid
        );
    }

    #[test]
    fn test_english_lexicon() {
        let lexicon = TermLexicon::english();
        assert_eq!(
            select_strategy("How many minutes does the daily scrum last?", &lexicon),
            Strategy::Hybrid
        );
        assert_eq!(select_strategy("Why hold a retrospective?", &lexicon), Strategy::Diversity);
        assert_eq!(dynamic_k("Who attends and why?", 6, 12, &lexicon), 10);
    }

    #[test]
    fn test_fixed_choice_bypasses_selection() {
        let lexicon = turkish();
        let question = "Daily Scrum ne kadar surer?";
        assert_eq!(
            resolve_strategy(StrategyChoice::Auto, question, &lexicon),
            Strategy::Hybrid
        );
        assert_eq!(
            resolve_strategy(StrategyChoice::Fixed(Strategy::Threshold), question, &lexicon),
            Strategy::Threshold
        );
    }
}
