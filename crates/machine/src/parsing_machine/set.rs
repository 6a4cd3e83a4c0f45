use std::fmt;

/// Set of bytes matched by the charset and span instructions.
#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct Set {
    // 32 * 8 = 256 bits
    inner: [u32; 8],
}

impl Set {
    pub fn new() -> Set {
        Set { inner: [0u32; 8] }
    }

    pub fn from_bytes(bytes: &[u8]) -> Set {
        let mut set = Set::new();
        for byte in bytes {
            set.add(*byte);
        }
        set
    }

    pub fn add(&mut self, n: u8) {
        let num = (n / 32) as usize;
        let pos = n % 32;
        self.inner[num] |= 1 << pos;
    }

    /// Add all bytes from `lo` to `hi` inclusive
    pub fn add_range(&mut self, lo: u8, hi: u8) {
        for n in lo..=hi {
            self.add(n);
        }
    }

    pub fn negate(&mut self) {
        for word in self.inner.iter_mut() {
            *word = !*word;
        }
    }

    pub fn has(&self, n: u8) -> bool {
        let num = (n / 32) as usize;
        let pos = n % 32;
        self.inner[num] & (1 << pos) != 0
    }

    fn len(&self) -> usize {
        self.inner.iter().map(|word| word.count_ones() as usize).sum()
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut first = true;
        for i in 0..=255 {
            if !self.has(i) {
                continue;
            }

            if first {
                write!(f, "{i}")?;
            } else {
                write!(f, ", {i}")?;
            }

            first = false;
        }
        f.write_str("]")
    }
}

/// Ranges of members, or of non-members when the set is mostly full, ie.
/// `[_ a-z]` or `[^(-)]`.
impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn byte(f: &mut fmt::Formatter<'_>, b: u8) -> fmt::Result {
            if (33..127).contains(&b) {
                write!(f, "{}", b as char)
            } else {
                write!(f, "\\x{b:02X}")
            }
        }

        let negated = self.len() > 128;
        f.write_str(if negated { "[^" } else { "[" })?;

        let mut first = true;
        let mut n = 0usize;
        while n < 256 {
            if self.has(n as u8) == negated {
                n += 1;
                continue;
            }

            let start = n;
            while n < 256 && self.has(n as u8) != negated {
                n += 1;
            }
            let end = n - 1;

            if !first {
                f.write_str(" ")?;
            }
            first = false;

            byte(f, start as u8)?;
            if end > start {
                f.write_str("-")?;
                byte(f, end as u8)?;
            }
        }

        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_added() {
        let mut set = Set::new();
        set.add(2);
        set.add(50);

        assert!(set.has(2));
        assert!(set.has(50));
        assert!(!set.has(3));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn negate() {
        let mut set = Set::from_bytes(b"()");
        set.negate();
        assert!(!set.has(b'('));
        assert!(set.has(b'a'));
        assert!(set.has(255));
        assert_eq!(set.len(), 254);
    }

    #[test]
    fn display_ranges() {
        let mut set = Set::new();
        set.add_range(b'a', b'z');
        set.add(b'_');
        assert_eq!(set.to_string(), "[_ a-z]");

        let mut set = Set::from_bytes(b"()");
        set.negate();
        assert_eq!(set.to_string(), "[^(-)]");
    }
}
