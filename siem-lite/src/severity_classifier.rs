use crate::configuration::{Configuration, SeverityRules};
use siem_lite_common::{LogEvent, Severity, SeverityOrigin};

#[derive(Debug, Clone, PartialEq)]
pub struct SeverityClassification {
    pub severity: Severity,
    pub origin: SeverityOrigin,
    /// Keyword that decided a derived severity, if any.
    pub matched_keyword: Option<String>,
}

pub trait SeverityClassifier: Send + Sync {
    fn classify(&self, event: &LogEvent) -> SeverityClassification;

    fn should_alert(&self, classification: &SeverityClassification) -> bool {
        classification.severity.is_alert()
    }

    /// Store the derived severity on events that arrived without one.
    fn resolve(&self, event: &mut LogEvent) {
        if !event.has_supplied_severity() {
            let classification = self.classify(event);
            event.apply_derived_severity(classification.severity);
        }
    }
}

/// First-match-wins keyword fallback over the event type.
///
/// Levels are checked critical, then high, then medium; anything else is low.
#[derive(Debug, Clone)]
pub struct KeywordSeverityClassifier {
    rules: Vec<(Severity, Vec<String>)>,
}

impl KeywordSeverityClassifier {
    pub fn new(rules: &SeverityRules) -> Self {
        let lower = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .filter(|w| !w.is_empty())
                .map(|w| w.to_lowercase())
                .collect()
        };

        Self {
            rules: vec![
                (Severity::Critical, lower(&rules.critical)),
                (Severity::High, lower(&rules.high)),
                (Severity::Medium, lower(&rules.medium)),
            ],
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(&config.severity)
    }

    /// Derive a severity from free text.
    pub fn derive(&self, text: &str) -> (Severity, Option<&str>) {
        let text = text.to_lowercase();
        for (severity, keywords) in &self.rules {
            if let Some(keyword) = keywords.iter().find(|k| text.contains(k.as_str())) {
                return (*severity, Some(keyword.as_str()));
            }
        }
        (Severity::Low, None)
    }
}

impl Default for KeywordSeverityClassifier {
    fn default() -> Self {
        Self::new(&SeverityRules::default())
    }
}

impl SeverityClassifier for KeywordSeverityClassifier {
    fn classify(&self, event: &LogEvent) -> SeverityClassification {
        if event.has_supplied_severity() {
            return SeverityClassification {
                severity: event.severity,
                origin: SeverityOrigin::Supplied,
                matched_keyword: None,
            };
        }

        let (severity, keyword) = self.derive(&event.event_type);
        SeverityClassification {
            severity,
            origin: SeverityOrigin::Derived,
            matched_keyword: keyword.map(str::to_string),
        }
    }
}
