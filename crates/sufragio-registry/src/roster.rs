//! Electoral roster: which national id (cédula) belongs to which
//! parish. Consulted before registration so only eligible voters enter
//! a parish group. Error messages never echo roster contents.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use sufragio_types::{GroupId, SufragioError, SufragioResult};
use tracing::info;

#[derive(Debug, Deserialize)]
struct RosterEntry {
    cedula: String,
    parroquia: String,
}

pub struct EligibilityRoster {
    by_cedula: HashMap<String, String>,
}

impl EligibilityRoster {
    /// Load a roster from a JSON file: an array of
    /// `{"cedula": ..., "parroquia": ...}` entries.
    pub fn load(path: impl AsRef<Path>) -> SufragioResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SufragioError::Config(format!("Failed to read roster: {}", e)))?;
        let entries: Vec<RosterEntry> = serde_json::from_str(&raw)
            .map_err(|e| SufragioError::Config(format!("Malformed roster: {}", e)))?;

        let roster = Self::from_entries(
            entries
                .into_iter()
                .map(|e| (e.cedula, e.parroquia)),
        );
        info!(entries = roster.len(), "Loaded electoral roster");
        Ok(roster)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            by_cedula: entries
                .into_iter()
                .map(|(cedula, parish)| (cedula.trim().to_string(), parish))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_cedula.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cedula.is_empty()
    }

    /// Parish a cédula is registered in, if any.
    pub fn parish_of(&self, cedula: &str) -> Option<&str> {
        self.by_cedula.get(cedula.trim()).map(String::as_str)
    }

    /// Check that a cédula may register in `parish`, returning that
    /// parish's group id on success.
    pub fn check(&self, cedula: &str, parish: &str) -> SufragioResult<GroupId> {
        let registered = self
            .parish_of(cedula)
            .ok_or(SufragioError::UnknownVoter)?;
        if GroupId::for_parish(registered) != GroupId::for_parish(parish) {
            return Err(SufragioError::WrongParish);
        }
        Ok(GroupId::for_parish(parish))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> EligibilityRoster {
        EligibilityRoster::from_entries([
            ("1712345678".to_string(), "Cotocollao".to_string()),
            ("1798765432".to_string(), "Quitumbe".to_string()),
        ])
    }

    #[test]
    fn test_check_accepts_registered_pair() {
        let r = roster();
        let id = r.check("1712345678", "Cotocollao").unwrap();
        assert_eq!(id, GroupId::for_parish("Cotocollao"));
        // Parish matching is normalization-insensitive.
        assert!(r.check("1712345678", "  cotocollao ").is_ok());
    }

    #[test]
    fn test_unknown_and_wrong_parish_are_distinct() {
        let r = roster();
        assert!(matches!(
            r.check("0000000000", "Cotocollao"),
            Err(SufragioError::UnknownVoter)
        ));
        assert!(matches!(
            r.check("1712345678", "Quitumbe"),
            Err(SufragioError::WrongParish)
        ));
    }

    #[test]
    fn test_error_messages_do_not_leak_roster_data() {
        let r = roster();
        let err = r.check("1712345678", "Quitumbe").unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("1712345678"));
        assert!(!msg.contains("Cotocollao"));
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(
            &path,
            r#"[{"cedula": "1712345678", "parroquia": "Cotocollao"}]"#,
        )
        .unwrap();

        let r = EligibilityRoster::load(&path).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.parish_of("1712345678"), Some("Cotocollao"));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            EligibilityRoster::load(&path),
            Err(SufragioError::Config(_))
        ));
    }
}
