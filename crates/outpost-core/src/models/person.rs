use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Age at which a roster member is considered an adult.
const ADULT_AGE: i32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Youth,
    Adult,
}

impl MemberType {
    /// Infer the member type from an age in whole years.
    pub fn from_age(age: i32) -> Self {
        if age < ADULT_AGE {
            MemberType::Youth
        } else {
            MemberType::Adult
        }
    }
}

impl std::fmt::Display for MemberType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberType::Youth => write!(f, "Youth"),
            MemberType::Adult => write!(f, "Adult"),
        }
    }
}

/// Whole years between `birth_date` and `on`.
pub fn age_on(birth_date: NaiveDate, on: NaiveDate) -> i32 {
    let mut age = on.year() - birth_date.year();
    if (on.month(), on.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct RosterMember {
    pub id: String,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(rename = "memberType", default)]
    pub member_type: Option<MemberType>,
    #[serde(rename = "birthDate", default)]
    pub birth_date: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RosterMember {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    pub fn date_of_birth(&self) -> Option<NaiveDate> {
        self.birth_date
            .as_deref()
            .and_then(|dob| NaiveDate::parse_from_str(dob, "%Y-%m-%d").ok())
    }

    pub fn age(&self) -> Option<i32> {
        self.date_of_birth()
            .map(|dob| age_on(dob, Utc::now().date_naive()))
    }

    /// Explicit member type if the server sent one, else inferred from age.
    pub fn resolved_member_type(&self) -> Option<MemberType> {
        self.member_type
            .or_else(|| self.age().map(MemberType::from_age))
    }
}

/// Attendee list for one outing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(transparent)]
pub struct Roster(pub Vec<RosterMember>);

impl Roster {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn members(&self) -> &[RosterMember] {
        &self.0
    }

    pub fn count_of(&self, member_type: MemberType) -> usize {
        self.0
            .iter()
            .filter(|m| m.resolved_member_type() == Some(member_type))
            .count()
    }
}
