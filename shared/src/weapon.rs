//! Closed sets of weapon models and animation clips.
//!
//! Names are the asset names used by the character model; anything else is
//! rejected when parsed.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Weapon {
    GrenadeLauncher,
    #[serde(rename = "AK")]
    Ak,
    #[serde(rename = "Knife_1")]
    Knife1,
    #[serde(rename = "Knife_2")]
    Knife2,
    #[default]
    Pistol,
    Revolver,
    #[serde(rename = "Revolver_Small")]
    RevolverSmall,
    RocketLauncher,
    ShortCannon,
    #[serde(rename = "SMG")]
    Smg,
    Shotgun,
    Shovel,
    Sniper,
    #[serde(rename = "Sniper_2")]
    Sniper2,
}

impl Weapon {
    pub const ALL: [Weapon; 14] = [
        Weapon::GrenadeLauncher,
        Weapon::Ak,
        Weapon::Knife1,
        Weapon::Knife2,
        Weapon::Pistol,
        Weapon::Revolver,
        Weapon::RevolverSmall,
        Weapon::RocketLauncher,
        Weapon::ShortCannon,
        Weapon::Smg,
        Weapon::Shotgun,
        Weapon::Shovel,
        Weapon::Sniper,
        Weapon::Sniper2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weapon::GrenadeLauncher => "GrenadeLauncher",
            Weapon::Ak => "AK",
            Weapon::Knife1 => "Knife_1",
            Weapon::Knife2 => "Knife_2",
            Weapon::Pistol => "Pistol",
            Weapon::Revolver => "Revolver",
            Weapon::RevolverSmall => "Revolver_Small",
            Weapon::RocketLauncher => "RocketLauncher",
            Weapon::ShortCannon => "ShortCannon",
            Weapon::Smg => "SMG",
            Weapon::Shotgun => "Shotgun",
            Weapon::Shovel => "Shovel",
            Weapon::Sniper => "Sniper",
            Weapon::Sniper2 => "Sniper_2",
        }
    }
}

impl fmt::Display for Weapon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weapon {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weapon::ALL
            .iter()
            .copied()
            .find(|weapon| weapon.as_str() == s)
            .ok_or_else(|| ParseError::UnknownWeapon(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AnimationTag {
    #[default]
    Idle,
    #[serde(rename = "Idle_Shoot")]
    IdleShoot,
    Run,
    #[serde(rename = "Run_Shoot")]
    RunShoot,
    Death,
}

impl AnimationTag {
    /// Animation for a frame. Death wins over everything else.
    pub fn select(moving: bool, firing: bool, alive: bool) -> AnimationTag {
        match (alive, moving, firing) {
            (false, _, _) => AnimationTag::Death,
            (true, true, true) => AnimationTag::RunShoot,
            (true, true, false) => AnimationTag::Run,
            (true, false, true) => AnimationTag::IdleShoot,
            (true, false, false) => AnimationTag::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationTag::Idle => "Idle",
            AnimationTag::IdleShoot => "Idle_Shoot",
            AnimationTag::Run => "Run",
            AnimationTag::RunShoot => "Run_Shoot",
            AnimationTag::Death => "Death",
        }
    }

    /// Death plays once and holds its last frame.
    pub fn loops(&self) -> bool {
        !matches!(self, AnimationTag::Death)
    }
}

impl fmt::Display for AnimationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimationTag {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AnimationTag::Idle,
            AnimationTag::IdleShoot,
            AnimationTag::Run,
            AnimationTag::RunShoot,
            AnimationTag::Death,
        ]
        .into_iter()
        .find(|tag| tag.as_str() == s)
        .ok_or_else(|| ParseError::UnknownAnimation(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weapon_names_parse_back() {
        for weapon in Weapon::ALL {
            assert_eq!(weapon.as_str().parse::<Weapon>().unwrap(), weapon);
        }
    }

    #[test]
    fn test_unknown_weapon_rejected() {
        assert_eq!(
            "Bazooka".parse::<Weapon>(),
            Err(ParseError::UnknownWeapon("Bazooka".to_string()))
        );
        assert!("ak".parse::<Weapon>().is_err());
    }

    #[test]
    fn test_default_weapon_is_pistol() {
        assert_eq!(Weapon::default(), Weapon::Pistol);
    }

    #[test]
    fn test_weapon_serde_uses_asset_names() {
        let json = serde_json::to_string(&Weapon::Sniper2).unwrap();
        assert_eq!(json, "\"Sniper_2\"");
        let weapon: Weapon = serde_json::from_str("\"SMG\"").unwrap();
        assert_eq!(weapon, Weapon::Smg);
    }

    #[test]
    fn test_animation_selection_table() {
        assert_eq!(AnimationTag::select(false, false, true), AnimationTag::Idle);
        assert_eq!(AnimationTag::select(false, true, true), AnimationTag::IdleShoot);
        assert_eq!(AnimationTag::select(true, false, true), AnimationTag::Run);
        assert_eq!(AnimationTag::select(true, true, true), AnimationTag::RunShoot);
        assert_eq!(AnimationTag::select(true, true, false), AnimationTag::Death);
        assert_eq!(AnimationTag::select(false, false, false), AnimationTag::Death);
    }

    #[test]
    fn test_death_does_not_loop() {
        assert!(!AnimationTag::Death.loops());
        assert!(AnimationTag::Run.loops());
        assert_eq!("Run_Shoot".parse::<AnimationTag>().unwrap(), AnimationTag::RunShoot);
    }
}
