// Static keyword tables for the message classifier.
//
// Everything here is lowercase and matched as a plain substring of the
// lowercased message, so stems ("предоплат", "доставк") cover word forms.

use super::moderation_models::{Category, RiskLevel};

/// One category's vocabulary.
pub struct KeywordGroup {
    pub category: Category,
    pub terms: &'static [&'static str],
}

/// Scan order is ascending priority: when several categories match, the
/// category scanned last becomes the primary one.
pub static KEYWORD_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        category: Category::PersonalMeeting,
        terms: &[
            "встретимся",
            "встретиться",
            "встреча",
            "при встрече",
            "лично в руки",
            "из рук в руки",
        ],
    },
    KeywordGroup {
        category: Category::SuspiciousContact,
        terms: &[
            "мой номер",
            "скинь номер",
            "дай номер",
            "номер телефона",
            "позвони мне",
            "набери меня",
            "в личку",
            "в лс",
            "email",
            "e-mail",
        ],
    },
    KeywordGroup {
        category: Category::DirectPayment,
        terms: &[
            "переведи на карту",
            "перевод на карту",
            "номер карты",
            "сбербанк",
            "тинькофф",
            "qiwi",
            "киви",
            "юмани",
            "криптой",
            "предоплат",
            "наличными",
            "наличкой",
        ],
    },
    KeywordGroup {
        category: Category::BypassPlatform,
        terms: &[
            "без платформы",
            "мимо платформы",
            "в обход",
            "без комиссии",
            "без гаранта",
            "без безопасной сделки",
            "напрямую",
            "минуя сервис",
        ],
    },
    KeywordGroup {
        category: Category::ExternalCommunication,
        terms: &[
            "whatsapp",
            "вотсап",
            "ватсап",
            "вацап",
            "telegram",
            "телеграм",
            "телеге",
            "viber",
            "вайбер",
            "instagram",
            "инстаграм",
            "вконтакте",
            "skype",
            "скайп",
            "discord",
            "дискорд",
        ],
    },
];

pub static HIGH_RISK_TERMS: &[&str] = &[
    "whatsapp",
    "вотсап",
    "ватсап",
    "вацап",
    "telegram",
    "телеграм",
    "телеге",
    "viber",
    "вайбер",
    "переведи на карту",
    "перевод на карту",
    "мимо платформы",
    "в обход",
    "без гаранта",
    "без безопасной сделки",
];

pub static MEDIUM_RISK_TERMS: &[&str] = &[
    "номер карты",
    "сбербанк",
    "тинькофф",
    "qiwi",
    "киви",
    "юмани",
    "криптой",
    "предоплат",
    "instagram",
    "инстаграм",
    "вконтакте",
    "skype",
    "скайп",
    "discord",
    "дискорд",
    "без платформы",
    "без комиссии",
    "напрямую",
    "минуя сервис",
    "мой номер",
    "скинь номер",
    "дай номер",
    "номер телефона",
    "позвони мне",
    "набери меня",
    "email",
    "e-mail",
];

/// Delivery and handover vocabulary. Its presence means the chat is most
/// likely coordinating a legitimate pickup.
pub static LEGITIMATE_TERMS: &[&str] = &[
    "самовывоз",
    "курьер",
    "доставк",
    "сдэк",
    "cdek",
    "boxberry",
    "боксберри",
    "почта россии",
    "почтой россии",
    "пункт выдачи",
    "пвз",
    "постамат",
    "заберу",
    "забрать",
    "у метро",
    "к метро",
    "до метро",
    "возле метро",
    "около метро",
    "станции метро",
    "магазин",
    "отделени",
    "pickup",
    "courier",
    "delivery",
];

/// Meeting language that is only suspicious alongside other evidence.
pub static CONTEXT_REQUIRED_TERMS: &[&str] = &[
    "встретимся",
    "встретиться",
    "встреча",
    "при встрече",
    "лично в руки",
    "из рук в руки",
];

pub const PHONE_EVIDENCE: &str = "phone_pattern";
pub const EMAIL_EVIDENCE: &str = "email_pattern";

/// Risk contributed by a single keyword.
pub fn term_tier(term: &str) -> RiskLevel {
    if HIGH_RISK_TERMS.contains(&term) {
        RiskLevel::High
    } else if MEDIUM_RISK_TERMS.contains(&term) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| text.contains(term))
}

pub fn is_context_required(evidence: &str) -> bool {
    CONTEXT_REQUIRED_TERMS.contains(&evidence)
}

pub fn is_pattern_evidence(evidence: &str) -> bool {
    evidence == PHONE_EVIDENCE || evidence == EMAIL_EVIDENCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_terms() -> impl Iterator<Item = &'static str> {
        KEYWORD_GROUPS.iter().flat_map(|g| g.terms.iter().copied())
    }

    #[test]
    fn tables_are_lowercase_and_trimmed() {
        let every_list = all_terms()
            .chain(HIGH_RISK_TERMS.iter().copied())
            .chain(MEDIUM_RISK_TERMS.iter().copied())
            .chain(LEGITIMATE_TERMS.iter().copied())
            .chain(CONTEXT_REQUIRED_TERMS.iter().copied());

        for term in every_list {
            assert_eq!(term, term.to_lowercase(), "{term} must be lowercase");
            assert_eq!(term, term.trim(), "{term} must be trimmed");
        }
    }

    #[test]
    fn tiered_and_context_terms_belong_to_a_category() {
        let terms: Vec<&str> = all_terms().collect();
        for term in HIGH_RISK_TERMS
            .iter()
            .chain(MEDIUM_RISK_TERMS)
            .chain(CONTEXT_REQUIRED_TERMS)
        {
            assert!(terms.contains(term), "{term} is not in any category");
        }
    }

    #[test]
    fn tiers_do_not_overlap() {
        for term in HIGH_RISK_TERMS {
            assert!(!MEDIUM_RISK_TERMS.contains(term), "{term} is in both tiers");
        }
    }

    #[test]
    fn every_category_is_scanned_once() {
        let mut seen = Vec::new();
        for group in KEYWORD_GROUPS {
            assert!(!seen.contains(&group.category));
            seen.push(group.category);
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn term_tier_lookup() {
        assert_eq!(term_tier("вотсап"), RiskLevel::High);
        assert_eq!(term_tier("сбербанк"), RiskLevel::Medium);
        assert_eq!(term_tier("встретимся"), RiskLevel::Low);
    }

    #[test]
    fn legitimate_terms_ignore_measurements() {
        for text in ["кабель 10 метров", "ширина 2 метра", "высота 40 сантиметров"] {
            assert!(!contains_any(text, LEGITIMATE_TERMS), "{text} looks like logistics");
        }
        assert!(contains_any("встретимся у метро", LEGITIMATE_TERMS));
    }
}
