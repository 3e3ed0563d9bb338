use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(TestStatus {
    Pending => "pending",
    Completed => "completed",
});

str_enum!(RecommendationStatus {
    Pending => "pending",
    Sent => "sent",
    Approved => "approved",
});

str_enum!(Gender {
    Male => "male",
    Female => "female",
});

impl Gender {
    /// Numeric encoding used for the Gender measurement value (0 = male,
    /// 1 = female), matching the classifier's training data.
    pub fn code(&self) -> f64 {
        match self {
            Gender::Male => 0.0,
            Gender::Female => 1.0,
        }
    }

    pub fn from_code(code: f64) -> Gender {
        if code == 0.0 {
            Gender::Male
        } else {
            Gender::Female
        }
    }

    /// Short label the external classifier expects ("M"/"F").
    pub fn classifier_label(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }

    /// Human-readable label used in recommendation prompts.
    pub fn display_label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    /// Lenient parse of uploaded gender cells: M/F, male/female, 0/1.
    pub fn parse_cell(raw: &str) -> Option<Gender> {
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" | "0" => Some(Gender::Male),
            "f" | "female" | "1" => Some(Gender::Female),
            _ => None,
        }
    }
}
