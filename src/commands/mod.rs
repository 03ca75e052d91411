pub mod inspect;

#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    One,
    Two,
    Specific(String),
}

impl Patch {
    /// Version string understood by [crate::bundle_loader::cdn_base_url]
    pub fn version(&self) -> &str {
        use Patch::*;
        match self {
            One => "1",
            Two => "2",
            Specific(v) => v,
        }
    }
}

impl std::str::FromStr for Patch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Patch::One),
            "2" => Ok(Patch::Two),
            s if s.starts_with("3.") || s.starts_with("4.") => Ok(Patch::Specific(s.to_string())),
            s => Err(format!("Invalid patch version {s:?}, expected 1, 2, 3.x or 4.x")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Patch;

    #[test]
    fn test_parse_patch() {
        assert_eq!("1".parse::<Patch>().unwrap(), Patch::One);
        assert_eq!("2".parse::<Patch>().unwrap().version(), "2");
        assert_eq!(
            "3.25.3.4".parse::<Patch>().unwrap(),
            Patch::Specific("3.25.3.4".to_string())
        );
        assert!("banana".parse::<Patch>().is_err());
    }
}
