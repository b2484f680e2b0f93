//! Nuid tree addressing
//!
//! A nuid encodes a node's path from the guide root as fixed-width, lowercase
//! base-36 segments. Siblings are numbered from `001`, so lexicographic order of
//! nuids follows insertion order within one level and every ancestor's nuid is a
//! prefix of its descendants' nuids.

use thiserror::Error;

/// Characters per tree level
pub const NUID_BLOCK_WIDTH: usize = 3;

const NUID_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Largest value a single segment can hold (`zzz`)
pub const MAX_BLOCK_VALUE: u64 = 36 * 36 * 36 - 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NuidError {
    #[error("Nuid level exhausted after '{0}'")]
    LevelExhausted(String),

    #[error("Value {0} does not fit into one nuid segment")]
    ValueTooLarge(u64),

    #[error("Malformed nuid: '{0}'")]
    Malformed(String),
}

/// Stateless helper for nuid arithmetic
pub struct NuidManager;

impl NuidManager {
    /// Encode a decimal into one zero-padded segment
    ///
    /// # Examples
    /// ```
    /// use naturekey_core::db::NuidManager;
    ///
    /// assert_eq!(NuidManager::decimal_to_nuid(1).unwrap(), "001");
    /// assert_eq!(NuidManager::decimal_to_nuid(36).unwrap(), "010");
    /// ```
    pub fn decimal_to_nuid(value: u64) -> Result<String, NuidError> {
        if value > MAX_BLOCK_VALUE {
            return Err(NuidError::ValueTooLarge(value));
        }

        let mut block = [b'0'; NUID_BLOCK_WIDTH];
        let mut rest = value;
        for slot in block.iter_mut().rev() {
            *slot = NUID_DIGITS[(rest % 36) as usize];
            rest /= 36;
        }

        Ok(block.iter().map(|b| *b as char).collect())
    }

    /// Decode one segment back into its decimal value
    pub fn nuid_to_decimal(block: &str) -> Result<u64, NuidError> {
        if block.len() != NUID_BLOCK_WIDTH {
            return Err(NuidError::Malformed(block.to_string()));
        }

        block.chars().try_fold(0u64, |acc, c| {
            c.to_digit(36)
                .filter(|_| !c.is_ascii_uppercase())
                .map(|d| acc * 36 + d as u64)
                .ok_or_else(|| NuidError::Malformed(block.to_string()))
        })
    }

    /// Nuid of the guide root: the guide id segment followed by `001`
    pub fn root_nuid(guide_id: u64) -> Result<String, NuidError> {
        Ok(format!("{}{}", Self::decimal_to_nuid(guide_id)?, Self::first_block()))
    }

    pub fn first_block() -> &'static str {
        "001"
    }

    /// Nuid of the first child below `parent`
    pub fn first_child_nuid(parent: &str) -> String {
        format!("{}{}", parent, Self::first_block())
    }

    /// Increment the last segment of `nuid`
    ///
    /// # Examples
    /// ```
    /// use naturekey_core::db::NuidManager;
    ///
    /// assert_eq!(NuidManager::next_nuid("001009").unwrap(), "00100a");
    /// assert_eq!(NuidManager::next_nuid("00100z").unwrap(), "001010");
    /// ```
    pub fn next_nuid(nuid: &str) -> Result<String, NuidError> {
        Self::validate(nuid)?;

        let split = nuid.len() - NUID_BLOCK_WIDTH;
        let (head, last) = nuid.split_at(split);
        let value = Self::nuid_to_decimal(last)?;
        if value >= MAX_BLOCK_VALUE {
            return Err(NuidError::LevelExhausted(nuid.to_string()));
        }

        Ok(format!("{}{}", head, Self::decimal_to_nuid(value + 1)?))
    }

    /// Next free child nuid given the nuids of the existing children
    pub fn next_child_nuid<'a, I>(parent: &str, children: I) -> Result<String, NuidError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match children.into_iter().max() {
            Some(last) => Self::next_nuid(last),
            None => Ok(Self::first_child_nuid(parent)),
        }
    }

    /// Nuid of the direct parent, `None` for a single-segment nuid
    pub fn parent_nuid(nuid: &str) -> Option<&str> {
        if nuid.len() <= NUID_BLOCK_WIDTH {
            return None;
        }
        Some(&nuid[..nuid.len() - NUID_BLOCK_WIDTH])
    }

    /// All proper ancestors, nearest first
    pub fn ancestor_nuids(nuid: &str) -> Vec<&str> {
        let mut ancestors = Vec::new();
        let mut current = nuid;
        while let Some(parent) = Self::parent_nuid(current) {
            ancestors.push(parent);
            current = parent;
        }
        ancestors
    }

    /// True if `candidate` lies strictly below `ancestor`
    pub fn is_descendant(candidate: &str, ancestor: &str) -> bool {
        candidate.len() > ancestor.len() && candidate.starts_with(ancestor)
    }

    /// True if `child` is exactly one level below `parent`
    pub fn is_direct_child(child: &str, parent: &str) -> bool {
        child.len() == parent.len() + NUID_BLOCK_WIDTH && child.starts_with(parent)
    }

    /// Number of segments
    pub fn depth(nuid: &str) -> usize {
        nuid.len() / NUID_BLOCK_WIDTH
    }

    /// Replace the `old_prefix` of `nuid` with `new_prefix`
    pub fn rebase(nuid: &str, old_prefix: &str, new_prefix: &str) -> Result<String, NuidError> {
        match nuid.strip_prefix(old_prefix) {
            Some(rest) => Ok(format!("{}{}", new_prefix, rest)),
            None => Err(NuidError::Malformed(nuid.to_string())),
        }
    }

    /// Check length and alphabet
    pub fn validate(nuid: &str) -> Result<(), NuidError> {
        let well_formed = !nuid.is_empty()
            && nuid.len() % NUID_BLOCK_WIDTH == 0
            && nuid
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase());

        if well_formed {
            Ok(())
        } else {
            Err(NuidError::Malformed(nuid.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_to_nuid() {
        assert_eq!(NuidManager::decimal_to_nuid(0).unwrap(), "000");
        assert_eq!(NuidManager::decimal_to_nuid(35).unwrap(), "00z");
        assert_eq!(NuidManager::decimal_to_nuid(36).unwrap(), "010");
        assert_eq!(NuidManager::decimal_to_nuid(MAX_BLOCK_VALUE).unwrap(), "zzz");
        assert_eq!(
            NuidManager::decimal_to_nuid(MAX_BLOCK_VALUE + 1),
            Err(NuidError::ValueTooLarge(MAX_BLOCK_VALUE + 1))
        );
    }

    #[test]
    fn test_nuid_to_decimal() {
        assert_eq!(NuidManager::nuid_to_decimal("00a").unwrap(), 10);
        assert_eq!(NuidManager::nuid_to_decimal("zzz").unwrap(), MAX_BLOCK_VALUE);
        assert!(NuidManager::nuid_to_decimal("0A1").is_err());
        assert!(NuidManager::nuid_to_decimal("01").is_err());
    }

    #[test]
    fn test_root_nuid() {
        assert_eq!(NuidManager::root_nuid(1).unwrap(), "001001");
        assert_eq!(NuidManager::root_nuid(37).unwrap(), "011001");
    }

    #[test]
    fn test_next_nuid() {
        assert_eq!(NuidManager::next_nuid("001001").unwrap(), "001002");
        assert_eq!(NuidManager::next_nuid("001009").unwrap(), "00100a");
        assert_eq!(NuidManager::next_nuid("00100z").unwrap(), "001010");
        assert_eq!(
            NuidManager::next_nuid("001zzz"),
            Err(NuidError::LevelExhausted("001zzz".to_string()))
        );
        assert!(NuidManager::next_nuid("0010").is_err());
    }

    #[test]
    fn test_next_child_nuid() {
        assert_eq!(
            NuidManager::next_child_nuid("001001", Vec::<&str>::new()).unwrap(),
            "001001001"
        );
        assert_eq!(
            NuidManager::next_child_nuid("001001", vec!["001001001", "001001003"]).unwrap(),
            "001001004"
        );
    }

    #[test]
    fn test_ancestors_and_prefixes() {
        assert_eq!(
            NuidManager::ancestor_nuids("001002003"),
            vec!["001002", "001"]
        );
        assert_eq!(NuidManager::parent_nuid("001"), None);
        assert!(NuidManager::is_descendant("001002003", "001002"));
        assert!(!NuidManager::is_descendant("001002", "001002"));
        assert!(NuidManager::is_direct_child("001002003", "001002"));
        assert!(!NuidManager::is_direct_child("001002003004", "001002"));
        assert_eq!(NuidManager::depth("001002003"), 3);
    }

    #[test]
    fn test_rebase() {
        assert_eq!(
            NuidManager::rebase("001002005", "001002", "001004001").unwrap(),
            "001004001005"
        );
        assert!(NuidManager::rebase("001003", "001002", "001004").is_err());
    }
}
