//! Closed persona taxonomy.
//!
//! Personas are a closed set: every roster entry, dispatch, and response
//! schema is keyed by one of these variants, never by a free-form string.
//! The analysis panel and the ideation bench are separate sets with
//! separate output schemas.

use serde::{Deserialize, Serialize};

/// Analytical personas dispatched over a validation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persona {
    MomentumTrader,
    RiskManager,
    QuantResearcher,
    Contrarian,
    MadGenius,
}

impl Persona {
    pub const ALL: [Persona; 5] = [
        Persona::MomentumTrader,
        Persona::RiskManager,
        Persona::QuantResearcher,
        Persona::Contrarian,
        Persona::MadGenius,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MomentumTrader => "momentum-trader",
            Self::RiskManager => "risk-manager",
            Self::QuantResearcher => "quant-researcher",
            Self::Contrarian => "contrarian",
            Self::MadGenius => "mad-genius",
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation personas used by ideation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdeationPersona {
    EdgeHunter,
    MacroStrategist,
    QuantArchaeologist,
}

impl IdeationPersona {
    pub const ALL: [IdeationPersona; 3] = [
        IdeationPersona::EdgeHunter,
        IdeationPersona::MacroStrategist,
        IdeationPersona::QuantArchaeologist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdgeHunter => "edge-hunter",
            Self::MacroStrategist => "macro-strategist",
            Self::QuantArchaeologist => "quant-archaeologist",
        }
    }
}

impl std::fmt::Display for IdeationPersona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_uses_kebab_names() {
        let json = serde_json::to_string(&Persona::QuantResearcher).unwrap();
        assert_eq!(json, "\"quant-researcher\"");
        let back: Persona = serde_json::from_str("\"mad-genius\"").unwrap();
        assert_eq!(back, Persona::MadGenius);
    }

    #[test]
    fn test_unknown_persona_rejected() {
        assert!(serde_json::from_str::<Persona>("\"astrologer\"").is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for persona in Persona::ALL {
            let json = serde_json::to_string(&persona).unwrap();
            assert_eq!(json.trim_matches('"'), persona.to_string());
        }
        for persona in IdeationPersona::ALL {
            let json = serde_json::to_string(&persona).unwrap();
            assert_eq!(json.trim_matches('"'), persona.to_string());
        }
    }
}
