//! The scenario catalog.
//!
//! A catalog is an ordered list of scenario definitions. Order matters for the
//! multi-scenario flow, which presents scenarios in catalog order; direct
//! lookup by id ignores it. The catalog is never mutated after construction.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::CatalogError;

// ──────────────────────────────────────────────
// ScenarioId
// ──────────────────────────────────────────────

/// The fixed set of scenario identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioId {
    Kunstwerk,
    Aufsatz,
    Person,
    Lebenslauf,
    Produkt,
}

impl ScenarioId {
    /// Every scenario id, in the order of the built-in catalog.
    pub const ALL: [ScenarioId; 5] = [
        ScenarioId::Kunstwerk,
        ScenarioId::Aufsatz,
        ScenarioId::Person,
        ScenarioId::Lebenslauf,
        ScenarioId::Produkt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioId::Kunstwerk => "kunstwerk",
            ScenarioId::Aufsatz => "aufsatz",
            ScenarioId::Person => "person",
            ScenarioId::Lebenslauf => "lebenslauf",
            ScenarioId::Produkt => "produkt",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownScenario { raw: s.to_string() })
    }
}

// ──────────────────────────────────────────────
// ScenarioDefinition
// ──────────────────────────────────────────────

/// One scenario: a question, an inclusive rating scale and two framing texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: ScenarioId,
    pub title: String,
    pub question: String,
    pub min_value: i32,
    pub max_value: i32,
    pub high_label: String,
    pub low_label: String,
    /// Display asset. `None` means no image is shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ScenarioDefinition {
    /// The initial slider position: the midpoint of the scale, rounded half up.
    ///
    /// `round((min + max) / 2)` computed in integers, so `1..=10` gives 6 and
    /// `1..=6` gives 4.
    pub fn default_rating(&self) -> i32 {
        (self.min_value + self.max_value + 1).div_euclid(2)
    }

    /// Whether `rating` lies on this scenario's scale.
    pub fn accepts(&self, rating: i32) -> bool {
        (self.min_value..=self.max_value).contains(&rating)
    }

    /// The framing text shown under `condition`.
    pub fn label_for(&self, condition: Condition) -> &str {
        match condition {
            Condition::High => &self.high_label,
            Condition::Low => &self.low_label,
        }
    }
}

// ──────────────────────────────────────────────
// Catalog
// ──────────────────────────────────────────────

/// An ordered, validated, read-only list of scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    scenarios: Vec<ScenarioDefinition>,
}

impl Catalog {
    /// Build a catalog from explicit definitions.
    ///
    /// Rejects an empty list, duplicate ids and scales where `min >= max`.
    pub fn new(scenarios: Vec<ScenarioDefinition>) -> Result<Self, CatalogError> {
        if scenarios.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = BTreeSet::new();
        for scenario in &scenarios {
            if !seen.insert(scenario.id) {
                return Err(CatalogError::DuplicateId {
                    id: scenario.id.to_string(),
                });
            }
            if scenario.min_value >= scenario.max_value {
                return Err(CatalogError::InvalidScale {
                    id: scenario.id.to_string(),
                    min: scenario.min_value,
                    max: scenario.max_value,
                });
            }
        }

        Ok(Catalog { scenarios })
    }

    /// The five seminar scenarios.
    pub fn builtin() -> Self {
        Catalog {
            scenarios: builtin_scenarios(),
        }
    }

    pub fn scenarios(&self) -> &[ScenarioDefinition] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// The scenario at `index` in presentation order.
    pub fn at(&self, index: usize) -> Option<&ScenarioDefinition> {
        self.scenarios.get(index)
    }

    pub fn get(&self, id: ScenarioId) -> Option<&ScenarioDefinition> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Look up a scenario by its raw textual id.
    ///
    /// Unknown strings and ids absent from this catalog both yield `None`.
    pub fn resolve(&self, raw: &str) -> Option<&ScenarioDefinition> {
        raw.parse::<ScenarioId>().ok().and_then(|id| self.get(id))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::builtin()
    }
}

fn builtin_scenarios() -> Vec<ScenarioDefinition> {
    vec![
        ScenarioDefinition {
            id: ScenarioId::Kunstwerk,
            title: "Bewertung eines Kunstwerks".into(),
            question: "Wie künstlerisch wertvoll findest du dieses Bild?".into(),
            min_value: 1,
            max_value: 10,
            high_label: "Dieses Bild stammt aus einer Ausstellung eines international bekannten modernen Künstlers.".into(),
            low_label: "Dieses Bild stammt aus einer Schülerarbeit einer 6. Klasse.".into(),
            image_url: Some("/images/kunstwerk.jpg".into()),
        },
        ScenarioDefinition {
            id: ScenarioId::Aufsatz,
            title: "Bewertung eines Schüleraufsatzes".into(),
            question: "Welche Note würdest du diesem Text geben?".into(),
            min_value: 1,
            max_value: 6,
            high_label: "Text von Lara, 7. Klasse. Laut Lehrkraft sehr gut in Deutsch, liest viel und ist engagiert.".into(),
            low_label: "Text von Lara, 7. Klasse. Laut Lehrkraft hat sie häufig Schwierigkeiten in Deutsch, liest selten und wirkt eher unmotiviert.".into(),
            image_url: Some("/images/aufsatz.jpg".into()),
        },
        ScenarioDefinition {
            id: ScenarioId::Person,
            title: "Eindruck von einer Person".into(),
            question: "Wie sympathisch wirkt diese Person auf dich?".into(),
            min_value: 1,
            max_value: 10,
            high_label: "Das ist Alex (22). Alex engagiert sich ehrenamtlich im Sportverein und hilft jüngeren Schüler*innen bei den Hausaufgaben.".into(),
            low_label: "Das ist Alex (22). Alex hatte kürzlich Ärger wegen eines Diebstahl-Verdachts und hat einen tiefergelegten VW Golf.".into(),
            image_url: Some("/images/person.jpg".into()),
        },
        ScenarioDefinition {
            id: ScenarioId::Lebenslauf,
            title: "Eindruck von einem Lebenslauf".into(),
            question: "Wie kompetent wirkt diese Person auf dich?".into(),
            min_value: 1,
            max_value: 10,
            high_label: "Bewerbung von Jasmin K. – Abschluss an einem renommierten Elite-Gymnasium, mehrfach für besondere Leistungen ausgezeichnet.".into(),
            low_label: "Bewerbung von Jasmin K. – Abschluss an einer städtischen Gesamtschule, ohne besondere Auszeichnungen.".into(),
            image_url: Some("/images/lebenslauf.jpg".into()),
        },
        ScenarioDefinition {
            id: ScenarioId::Produkt,
            title: "Bewertung eines Produkts".into(),
            question: "Wie hochwertig schätzt du dieses Produkt ein?".into(),
            min_value: 1,
            max_value: 10,
            high_label: "Marke: AURORA Pro Audio. UVP: 199 €. Beliebt bei vielen Musiker*innen.".into(),
            low_label: "Marke: SoundMax Basic. Preis: 24,99 €. Einfaches Einsteigermodell.".into(),
            image_url: Some("/images/produkt.jpg".into()),
        },
    ]
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
