use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Координата места в зале. Ряд и номер считаются с единицы.
///
/// На проводе место передаётся меткой: буквы ряда + номер (`A1`, `C3`, `AB12`).
/// После `Z` ряды продолжаются как `AA`, `AB`, ...
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatCoord {
    pub row: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeatLabelError {
    #[error("seat label is empty")]
    Empty,
    #[error("seat label `{0}` must be row letters followed by a seat number")]
    Malformed(String),
    #[error("seat label `{0}` is out of range")]
    OutOfRange(String),
}

impl SeatCoord {
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Буквенное обозначение ряда (1 -> A, 26 -> Z, 27 -> AA).
    pub fn row_letters(&self) -> String {
        let mut letters = Vec::new();
        let mut n = self.row;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(char::from(b'A' + rem as u8));
            n = (n - 1) / 26;
        }
        letters.iter().rev().collect()
    }
}

impl fmt::Display for SeatCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letters(), self.column)
    }
}

impl FromStr for SeatCoord {
    type Err = SeatLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        if label.is_empty() {
            return Err(SeatLabelError::Empty);
        }

        let split = label
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| SeatLabelError::Malformed(label.to_string()))?;
        let (letters, digits) = label.split_at(split);

        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SeatLabelError::Malformed(label.to_string()));
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(SeatLabelError::Malformed(label.to_string()));
        }

        let mut row: u32 = 0;
        for c in letters.chars() {
            let value = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
            row = row
                .checked_mul(26)
                .and_then(|r| r.checked_add(value))
                .ok_or_else(|| SeatLabelError::OutOfRange(label.to_string()))?;
        }

        let column: u32 = digits
            .parse()
            .map_err(|_| SeatLabelError::OutOfRange(label.to_string()))?;
        if column == 0 {
            return Err(SeatLabelError::OutOfRange(label.to_string()));
        }

        Ok(SeatCoord { row, column })
    }
}

impl TryFrom<String> for SeatCoord {
    type Error = SeatLabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatCoord> for String {
    fn from(value: SeatCoord) -> Self {
        value.to_string()
    }
}

/// Состояние места в схеме зала.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    Free,
    /// Временно заблокировано активным холдом, ещё не оплачено
    Held,
    /// Продано (подтверждённое бронирование)
    Occupied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_row_letters_and_column() {
        assert_eq!(SeatCoord::new(1, 1).to_string(), "A1");
        assert_eq!(SeatCoord::new(3, 3).to_string(), "C3");
        assert_eq!(SeatCoord::new(26, 4).to_string(), "Z4");
        assert_eq!(SeatCoord::new(27, 1).to_string(), "AA1");
        assert_eq!(SeatCoord::new(28, 12).to_string(), "AB12");
    }

    #[test]
    fn parses_labels_case_insensitively() {
        assert_eq!("A1".parse::<SeatCoord>().unwrap(), SeatCoord::new(1, 1));
        assert_eq!("c3".parse::<SeatCoord>().unwrap(), SeatCoord::new(3, 3));
        assert_eq!(" AA10 ".parse::<SeatCoord>().unwrap(), SeatCoord::new(27, 10));
    }

    #[test]
    fn rejects_malformed_labels() {
        assert_eq!("".parse::<SeatCoord>(), Err(SeatLabelError::Empty));
        assert!(matches!("12".parse::<SeatCoord>(), Err(SeatLabelError::Malformed(_))));
        assert!(matches!("A".parse::<SeatCoord>(), Err(SeatLabelError::Malformed(_))));
        assert!(matches!("A1B".parse::<SeatCoord>(), Err(SeatLabelError::Malformed(_))));
        assert!(matches!("A0".parse::<SeatCoord>(), Err(SeatLabelError::OutOfRange(_))));
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&vec![SeatCoord::new(1, 2), SeatCoord::new(3, 3)]).unwrap();
        assert_eq!(json, r#"["A2","C3"]"#);

        let back: Vec<SeatCoord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![SeatCoord::new(1, 2), SeatCoord::new(3, 3)]);

        assert!(serde_json::from_str::<SeatCoord>(r#""??""#).is_err());
    }
}
