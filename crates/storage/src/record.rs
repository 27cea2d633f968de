use pygmalion_core::{Condition, ScenarioId, SessionId};
use serde::{Deserialize, Serialize};

/// One submitted rating, as persisted.
///
/// Field names are the column names of the `responses` table. `rating` lies
/// within the scale of `scenario`; flow controllers enforce that before a
/// record is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub session_id: SessionId,
    pub scenario: ScenarioId,
    pub condition: Condition,
    pub rating: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_table_columns() {
        let record = ResponseRecord {
            session_id: SessionId::resolve(Some("seminar-1")),
            scenario: ScenarioId::Lebenslauf,
            condition: Condition::High,
            rating: 7,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({
                "session_id": "seminar-1",
                "scenario": "lebenslauf",
                "condition": "high",
                "rating": 7,
            })
        );
    }
}
