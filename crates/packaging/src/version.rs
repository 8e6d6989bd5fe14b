use std::{fmt, str::FromStr};

use anyhow::{Context, Result, bail};
use semver::{BuildMetadata, Prerelease, Version};

/// How to derive the next app version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionBump {
    Patch,
    Minor,
    Major,
    Exact(Version),
}

impl FromStr for VersionBump {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            _ => parse_version(s).map(Self::Exact),
        }
    }
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch => f.write_str("patch"),
            Self::Minor => f.write_str("minor"),
            Self::Major => f.write_str("major"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// Parse a version, accepting a leading `v` and missing minor or patch components.
pub fn parse_version(s: &str) -> Result<Version> {
    let trimmed = s.trim().trim_start_matches(['v', 'V']);
    let core_end = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(core_end);
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0{rest}"),
        1 => format!("{core}.0{rest}"),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded).with_context(|| format!("Invalid version '{s}'"))
}

/// Compute the version following `current`.
///
/// An explicit version must not be lower than `current`.
pub fn bump_version(current: &str, bump: &VersionBump) -> Result<Version> {
    let current = parse_version(current)?;
    let mut next = current.clone();
    match bump {
        VersionBump::Patch => next.patch += 1,
        VersionBump::Minor => {
            next.minor += 1;
            next.patch = 0;
        }
        VersionBump::Major => {
            next.major += 1;
            next.minor = 0;
            next.patch = 0;
        }
        VersionBump::Exact(version) => {
            if *version < current {
                bail!("Version {version} is lower than the current version {current}");
            }
            return Ok(version.clone());
        }
    }
    next.pre = Prerelease::EMPTY;
    next.build = BuildMetadata::EMPTY;
    Ok(next)
}
