// Message classifier - decides whether one chat message looks like an attempt
// to take a deal off the platform.
//
// Pure function, no I/O, no state. Precision is preferred over recall: delivery
// logistics share a lot of vocabulary with bypass attempts, so a message needs
// either a strong signal or several weak ones before it is flagged.

use super::keywords::{
    contains_any, is_context_required, is_pattern_evidence, term_tier, EMAIL_EVIDENCE,
    HIGH_RISK_TERMS, KEYWORD_GROUPS, LEGITIMATE_TERMS, PHONE_EVIDENCE,
};
use super::moderation_models::{Category, ClassificationResult, RiskLevel};
use regex::Regex;
use std::sync::LazyLock;

/// Russian mobile numbers: optional +7/8, a 9xx operator code, then seven
/// digits with optional separators. Must not sit inside a longer digit run,
/// so order and tracking numbers don't count.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|\D)(?:\+7|8)?[\s\-]?\(?9\d{2}\)?[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}(?:\D|$)",
    )
    .expect("Regex will always be valid")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").expect("Regex will always be valid")
});

/// Evidence accumulated while scanning one message.
struct Scan {
    evidence: Vec<String>,
    risk: RiskLevel,
    category: Option<Category>,
    matched_categories: Vec<Category>,
}

impl Scan {
    fn new() -> Self {
        Self {
            evidence: Vec::new(),
            risk: RiskLevel::Low,
            category: None,
            matched_categories: Vec::new(),
        }
    }

    fn record(&mut self, evidence: &str, risk: RiskLevel, category: Category) {
        if !self.evidence.iter().any(|e| e == evidence) {
            self.evidence.push(evidence.to_string());
        }
        self.risk = self.risk.escalate(risk);
        // Last match wins; see the scan order in KEYWORD_GROUPS.
        self.category = Some(category);
        if !self.matched_categories.contains(&category) {
            self.matched_categories.push(category);
        }
    }

    /// True when the only keyword evidence is ambiguous meeting language.
    fn only_context_terms(&self) -> bool {
        let has_context = self.evidence.iter().any(|e| is_context_required(e));
        let has_other = self
            .evidence
            .iter()
            .any(|e| !is_context_required(e) && !is_pattern_evidence(e));
        has_context && !has_other
    }
}

/// Classify one text message.
///
/// Returns `None` when the message is not suspicious. Never fails.
pub fn classify(text: &str) -> Option<ClassificationResult> {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    let has_legitimate = contains_any(&normalized, LEGITIMATE_TERMS);
    let has_phone = PHONE_PATTERN.is_match(&normalized);

    // Delivery talk is let through unless something high-risk rides along.
    if has_legitimate && !has_phone && !contains_any(&normalized, HIGH_RISK_TERMS) {
        return None;
    }

    let mut scan = Scan::new();

    for group in KEYWORD_GROUPS {
        for term in group.terms {
            if normalized.contains(term) {
                scan.record(term, term_tier(term), group.category);
            }
        }
    }

    if has_phone {
        scan.record(PHONE_EVIDENCE, RiskLevel::High, Category::ExternalCommunication);
    }
    if EMAIL_PATTERN.is_match(&normalized) {
        scan.record(EMAIL_EVIDENCE, RiskLevel::Medium, Category::ExternalCommunication);
    }

    let indicators = scan.evidence.len();

    if indicators < 2 && !has_legitimate && scan.only_context_terms() {
        return None;
    }

    let category = scan.category?;
    if scan.risk == RiskLevel::Low && indicators < 2 {
        return None;
    }

    Some(ClassificationResult {
        is_suspicious: true,
        detected_keywords: scan.evidence,
        risk_level: scan.risk,
        category,
        matched_categories: scan.matched_categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messenger_plus_phone_is_high_risk() {
        let result = classify("напиши мне в вотсап +79991234567").unwrap();

        assert!(result.is_suspicious);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.category, Category::ExternalCommunication);
        assert!(result.detected_keywords.contains(&"вотсап".to_string()));
        assert!(result.detected_keywords.contains(&"phone_pattern".to_string()));
    }

    #[test]
    fn pickup_coordination_is_not_flagged() {
        assert_eq!(classify("заберу товар самовывозом, встретимся у метро"), None);
        assert_eq!(classify("Оплачу наличными при встрече у метро"), None);
        assert_eq!(classify("Курьер СДЭК приедет завтра"), None);
    }

    #[test]
    fn lone_meeting_phrase_is_not_flagged() {
        assert_eq!(classify("встретимся"), None);
        assert_eq!(classify("  Встреча  "), None);
    }

    #[test]
    fn empty_and_plain_text_is_clean() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("   "), None);
        assert_eq!(classify("Здравствуйте, товар ещё в наличии?"), None);
    }

    #[test]
    fn high_risk_keyword_overrides_delivery_terms() {
        let result = classify("доставка не нужна, пиши в телеграм").unwrap();
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.category, Category::ExternalCommunication);
    }

    #[test]
    fn phone_number_overrides_delivery_terms() {
        let result = classify("курьер позвонит на +7 999 123-45-67").unwrap();
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.detected_keywords, vec!["phone_pattern".to_string()]);
    }

    #[test]
    fn phone_formats_are_recognised() {
        for text in ["89123456789", "8 (912) 345 67 89", "+7-912-345-67-89"] {
            let result = classify(text).unwrap_or_else(|| panic!("{text} not flagged"));
            assert_eq!(result.risk_level, RiskLevel::High);
        }
    }

    #[test]
    fn prices_are_not_phone_numbers() {
        assert_eq!(classify("отдам за 9500 рублей"), None);
    }

    #[test]
    fn order_and_tracking_numbers_are_not_phone_numbers() {
        assert_eq!(classify("заказ в пвз, номер заказа 109123456789"), None);
        assert_eq!(classify("посылку отправил сдэк, трек-номер 1498765432101"), None);
        assert_eq!(classify("артикул 89123456789012"), None);
    }

    #[test]
    fn phone_number_next_to_punctuation_is_found() {
        let result = classify("звони: 89123456789.").unwrap();
        assert_eq!(result.detected_keywords, vec!["phone_pattern".to_string()]);
    }

    #[test]
    fn measurements_do_not_hide_contact_requests() {
        let result = classify("кабель 10 метров, пиши в инстаграм").unwrap();
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.category, Category::ExternalCommunication);
    }

    #[test]
    fn email_is_medium_risk() {
        let result = classify("пиши на ivan.petrov@mail.ru").unwrap();
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.category, Category::ExternalCommunication);
        assert_eq!(result.detected_keywords, vec!["email_pattern".to_string()]);
    }

    #[test]
    fn single_medium_keyword_is_enough() {
        let result = classify("могу оплатить через сбербанк").unwrap();
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.category, Category::DirectPayment);
    }

    #[test]
    fn single_low_keyword_is_not_enough() {
        assert_eq!(classify("отдам наличкой"), None);
    }

    #[test]
    fn two_weak_signals_are_flagged_as_low() {
        let result = classify("встретимся, отдам наличкой").unwrap();
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.detected_keywords.len(), 2);
        assert_eq!(result.category, Category::DirectPayment);
    }

    #[test]
    fn highest_priority_category_wins() {
        let result = classify("давай без комиссии, скинь номер карты").unwrap();

        assert_eq!(result.category, Category::BypassPlatform);
        assert_eq!(
            result.matched_categories,
            vec![
                Category::SuspiciousContact,
                Category::DirectPayment,
                Category::BypassPlatform,
            ]
        );
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn pattern_sets_external_category_after_keywords() {
        let result = classify("без комиссии, мой адрес test@example.com").unwrap();
        assert_eq!(result.category, Category::ExternalCommunication);
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn evidence_is_deduplicated() {
        let result = classify("вотсап вотсап ВОТСАП").unwrap();
        assert_eq!(result.detected_keywords, vec!["вотсап".to_string()]);
    }
}
