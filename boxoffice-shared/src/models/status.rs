use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ticket status in the sale lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Available,
    Reserved,
    Sold,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Available => "available",
            TicketStatus::Reserved => "reserved",
            TicketStatus::Sold => "sold",
        }
    }

    /// `available → reserved → sold`, plus `reserved → available` on release.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Available, TicketStatus::Reserved)
                | (TicketStatus::Reserved, TicketStatus::Sold)
                | (TicketStatus::Reserved, TicketStatus::Available)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(TicketStatus::Available),
            "reserved" => Ok(TicketStatus::Reserved),
            "sold" => Ok(TicketStatus::Sold),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Reservation status. `Confirmed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Canceled => "canceled",
        }
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Canceled)
        )
    }

    /// Pending and confirmed reservations hold their ticket.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "canceled" => Ok(ReservationStatus::Canceled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted status column held a value outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status value: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_transitions() {
        use TicketStatus::*;
        assert!(Available.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(Sold));
        assert!(Reserved.can_transition_to(Available));

        assert!(!Available.can_transition_to(Sold));
        assert!(!Sold.can_transition_to(Available));
        assert!(!Sold.can_transition_to(Reserved));
        assert!(!Reserved.can_transition_to(Reserved));
    }

    #[test]
    fn test_reservation_terminal_states() {
        use ReservationStatus::*;
        for terminal in [Confirmed, Canceled] {
            for next in [Pending, Confirmed, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Canceled));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("sold".parse::<TicketStatus>().unwrap(), TicketStatus::Sold);
        assert_eq!(
            "canceled".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::Canceled
        );
        assert!("CANCELLED".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_status_serde_matches_column_values() {
        let json = serde_json::to_string(&TicketStatus::Reserved).unwrap();
        assert_eq!(json, "\"reserved\"");
        let json = serde_json::to_string(&ReservationStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
