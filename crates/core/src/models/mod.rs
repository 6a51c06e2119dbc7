//! Catalog data model shared by the client and any frontend.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Tag attached to every record built by [`Boardgame::new`].
pub const DEFAULT_TAG: &str = "B";

/// A board game record as exchanged with the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boardgame {
    /// Game title.
    pub name: String,
    /// Publishing house.
    pub publisher: String,
    /// Supported player count. Not validated client-side.
    pub player_number: i32,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Categories the game belongs to.
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Game mechanisms.
    #[serde(default)]
    pub mechanisms: Vec<Mechanism>,
    /// Add-on products, each a full record of its own.
    #[serde(default)]
    pub expansions: Vec<Boardgame>,
    /// Identifier assigned by the service; `None` until the record is created.
    ///
    /// Services that embed their storage model report it as `ID`.
    #[serde(
        rename = "boardgameID",
        alias = "ID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub boardgame_id: Option<u64>,
    /// Id of the base game when this record is an expansion.
    #[serde(
        rename = "boardgame_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<u64>,
}

impl Boardgame {
    /// Build a new, unsaved record carrying the default tag and no associations.
    pub fn new(name: impl Into<String>, publisher: impl Into<String>, player_number: i32) -> Self {
        Self {
            name: name.into(),
            publisher: publisher.into(),
            player_number,
            tags: vec![Tag::new(DEFAULT_TAG)],
            categories: Vec::new(),
            mechanisms: Vec::new(),
            expansions: Vec::new(),
            boardgame_id: None,
            parent_id: None,
        }
    }

    /// Minimal projection used when listing the catalog.
    pub fn summary(&self) -> BoardgameSummary {
        BoardgameSummary {
            name: self.name.clone(),
            publisher: self.publisher.clone(),
            player_number: self.player_number,
        }
    }

    /// Whether any expansions are attached.
    pub fn has_expansions(&self) -> bool {
        !self.expansions.is_empty()
    }

    /// Whether this record is an expansion of another one.
    pub fn is_expansion(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Name, publisher and player count of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardgameSummary {
    /// Game title.
    pub name: String,
    /// Publishing house.
    pub publisher: String,
    /// Supported player count.
    pub player_number: i32,
}

impl fmt::Display for BoardgameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.player_number == 1 {
            "player"
        } else {
            "players"
        };
        write!(
            f,
            "{} · {} · {} {}",
            self.name, self.publisher, self.player_number, noun
        )
    }
}

// Nested entities arrive either as `{"name": ...}` or as a bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum NamedRepr {
    Bare(String),
    Record { name: String },
}

impl NamedRepr {
    fn into_name(self) -> String {
        match self {
            NamedRepr::Bare(name) | NamedRepr::Record { name } => name,
        }
    }
}

macro_rules! named_entity {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        pub struct $ty {
            /// Display name, also the service-side key.
            pub name: String,
        }

        impl $ty {
            /// Wrap a name.
            pub fn new(name: impl Into<String>) -> Self {
                Self { name: name.into() }
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                NamedRepr::deserialize(deserializer).map(|repr| Self::new(repr.into_name()))
            }
        }

        impl From<&str> for $ty {
            fn from(name: &str) -> Self {
                Self::new(name)
            }
        }

        impl From<String> for $ty {
            fn from(name: String) -> Self {
                Self::new(name)
            }
        }
    };
}

named_entity!(
    /// Free-form label on a record.
    Tag
);
named_entity!(
    /// Catalog category such as "Strategy" or "Party".
    Category
);
named_entity!(
    /// Game mechanism such as "Deck Building".
    Mechanism
);
