//! Session identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite identifier of one logical counterparty connection.
///
/// Empty strings stand for "not set" on the optional parts, matching how the
/// identity is stored in every backend (the durable schema keys on all eight
/// columns and never stores NULL).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionID {
    pub begin_string: String,
    pub sender_comp_id: String,
    pub sender_sub_id: String,
    pub sender_location_id: String,
    pub target_comp_id: String,
    pub target_sub_id: String,
    pub target_location_id: String,
    pub qualifier: String,
}

impl SessionID {
    /// Create a session identity with only the mandatory parts set
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            ..Default::default()
        }
    }

    pub fn with_sender_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sender_sub_id = sub_id.into();
        self
    }

    pub fn with_sender_location_id(mut self, location_id: impl Into<String>) -> Self {
        self.sender_location_id = location_id.into();
        self
    }

    pub fn with_target_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.target_sub_id = sub_id.into();
        self
    }

    pub fn with_target_location_id(mut self, location_id: impl Into<String>) -> Self {
        self.target_location_id = location_id.into();
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    /// Filesystem-safe prefix used for per-session log and store files.
    ///
    /// `BeginString-Sender[_SubID][_LocID]-Target[_SubID][_LocID][-Qualifier]`
    pub fn filename_prefix(&self) -> String {
        let sender = join_present(&[&self.sender_comp_id, &self.sender_sub_id, &self.sender_location_id]);
        let target = join_present(&[&self.target_comp_id, &self.target_sub_id, &self.target_location_id]);

        let mut parts = vec![self.begin_string.clone(), sender, target];
        if !self.qualifier.is_empty() {
            parts.push(self.qualifier.clone());
        }
        parts.join("-")
    }
}

fn join_present(parts: &[&String]) -> String {
    let mut present = vec![parts[0].as_str()];
    present.extend(parts[1..].iter().filter(|p| !p.is_empty()).map(|p| p.as_str()));
    present.join("_")
}

impl fmt::Display for SessionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.begin_string, self.sender_comp_id)?;
        if !self.sender_sub_id.is_empty() {
            write!(f, "/{}", self.sender_sub_id)?;
        }
        if !self.sender_location_id.is_empty() {
            write!(f, "/{}", self.sender_location_id)?;
        }
        write!(f, "->{}", self.target_comp_id)?;
        if !self.target_sub_id.is_empty() {
            write!(f, "/{}", self.target_sub_id)?;
        }
        if !self.target_location_id.is_empty() {
            write!(f, "/{}", self.target_location_id)?;
        }
        if !self.qualifier.is_empty() {
            write!(f, ":{}", self.qualifier)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_prefix_minimal() {
        let id = SessionID::new("FIX.4.2", "SENDER", "TARGET");
        assert_eq!(id.filename_prefix(), "FIX.4.2-SENDER-TARGET");
    }

    #[test]
    fn test_filename_prefix_full() {
        let id = SessionID::new("FIX.4.4", "TW", "ARCA")
            .with_sender_sub_id("DESK")
            .with_sender_location_id("NY")
            .with_target_sub_id("GW")
            .with_qualifier("BS");
        assert_eq!(id.filename_prefix(), "FIX.4.4-TW_DESK_NY-ARCA_GW-BS");
    }

    #[test]
    fn test_filename_prefix_skips_sub_id_but_keeps_location() {
        let id = SessionID::new("FIXT.1.1", "A", "B").with_target_location_id("LDN");
        assert_eq!(id.filename_prefix(), "FIXT.1.1-A-B_LDN");
    }

    #[test]
    fn test_display() {
        let id = SessionID::new("FIX.4.2", "S", "T").with_sender_sub_id("X").with_qualifier("Q");
        assert_eq!(id.to_string(), "FIX.4.2:S/X->T:Q");
    }

    #[test]
    fn test_qualifier_distinguishes_sessions() {
        let a = SessionID::new("FIX.4.1", "TW", "ARCA");
        let b = a.clone().with_qualifier("BS");
        assert_ne!(a, b);
    }
}
