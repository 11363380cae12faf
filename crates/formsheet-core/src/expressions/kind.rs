use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FormsheetError;
use crate::schema::Flag;

/// The formula slots a path can hold. Each kind has its own dependency index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionKind {
    Value,
    Disable,
    CertificateVisible,
    Validation,
    TableRow,
    Repeat,
}

impl ExpressionKind {
    /// Every kind, in recomputation order.
    pub const ALL: [ExpressionKind; 6] = [
        ExpressionKind::Value,
        ExpressionKind::Disable,
        ExpressionKind::CertificateVisible,
        ExpressionKind::Validation,
        ExpressionKind::TableRow,
        ExpressionKind::Repeat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExpressionKind::Value => "value",
            ExpressionKind::Disable => "disable",
            ExpressionKind::CertificateVisible => "certificateVisible",
            ExpressionKind::Validation => "validation",
            ExpressionKind::TableRow => "tableRow",
            ExpressionKind::Repeat => "repeat",
        }
    }

    /// Slot of this kind in per-kind tables.
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// The schema flag a boolean kind writes.
    pub fn flag(self) -> Option<Flag> {
        match self {
            ExpressionKind::Disable => Some(Flag::Disabled),
            ExpressionKind::CertificateVisible => Some(Flag::ShowInCertificate),
            ExpressionKind::Validation => Some(Flag::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpressionKind {
    type Err = FormsheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpressionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FormsheetError::InvalidKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ExpressionKind::ALL {
            assert_eq!(kind.as_str().parse::<ExpressionKind>().unwrap(), kind);
        }
        assert_eq!(
            "tablerow".parse::<ExpressionKind>().unwrap(),
            ExpressionKind::TableRow
        );
        assert!("visible".parse::<ExpressionKind>().is_err());
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&ExpressionKind::CertificateVisible).unwrap();
        assert_eq!(json, "\"certificateVisible\"");
        let kind: ExpressionKind = serde_json::from_str("\"tableRow\"").unwrap();
        assert_eq!(kind, ExpressionKind::TableRow);
    }

    #[test]
    fn test_boolean_kinds_have_flags() {
        assert_eq!(ExpressionKind::Disable.flag(), Some(Flag::Disabled));
        assert_eq!(ExpressionKind::Value.flag(), None);
        assert_eq!(ExpressionKind::Repeat.flag(), None);
    }
}
