//! Ecosystem tags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Package-manager protocol spoken by a repository or adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Maven,
    Npm,
    Docker,
    Pypi,
    Helm,
    #[serde(alias = "go")]
    Golang,
    Cargo,
    Nuget,
    Rubygems,
    Terraform,
    Ansible,
    Conan,
    Generic,
}

impl Ecosystem {
    /// Every ecosystem, in declaration order
    pub const ALL: [Ecosystem; 13] = [
        Ecosystem::Maven,
        Ecosystem::Npm,
        Ecosystem::Docker,
        Ecosystem::Pypi,
        Ecosystem::Helm,
        Ecosystem::Golang,
        Ecosystem::Cargo,
        Ecosystem::Nuget,
        Ecosystem::Rubygems,
        Ecosystem::Terraform,
        Ecosystem::Ansible,
        Ecosystem::Conan,
        Ecosystem::Generic,
    ];

    /// Canonical lowercase tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Maven => "maven",
            Ecosystem::Npm => "npm",
            Ecosystem::Docker => "docker",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Helm => "helm",
            Ecosystem::Golang => "golang",
            Ecosystem::Cargo => "cargo",
            Ecosystem::Nuget => "nuget",
            Ecosystem::Rubygems => "rubygems",
            Ecosystem::Terraform => "terraform",
            Ecosystem::Ansible => "ansible",
            Ecosystem::Conan => "conan",
            Ecosystem::Generic => "generic",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        if tag == "go" {
            return Ok(Ecosystem::Golang);
        }
        Ecosystem::ALL
            .into_iter()
            .find(|e| e.as_str() == tag)
            .ok_or(CoreError::UnsupportedEcosystem { tag: s.to_string() })
    }
}
