use core::fmt::{self, Display, Formatter};

/// Rank used for override resolution and processing order.
///
/// Lower numeric value means higher priority, so sorting ascending puts the
/// most important entries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const HIGHEST: Self = Self(i32::MIN);
    pub const HIGH: Self = Self(-1000);
    pub const ABOVE_NORMAL: Self = Self(-100);
    pub const NORMAL: Self = Self(0);
    pub const BELOW_NORMAL: Self = Self(100);
    pub const LOW: Self = Self(1000);
    pub const LOWEST: Self = Self(i32::MAX);

    #[inline]
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    #[inline]
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for Priority {
    #[inline]
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::HIGHEST => f.write_str("highest"),
            Self::HIGH => f.write_str("high"),
            Self::ABOVE_NORMAL => f.write_str("above normal"),
            Self::NORMAL => f.write_str("normal"),
            Self::BELOW_NORMAL => f.write_str("below normal"),
            Self::LOW => f.write_str("low"),
            Self::LOWEST => f.write_str("lowest"),
            Self(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Priority;

    #[test]
    fn test_named_ranks_order() {
        let mut ranks = [
            Priority::LOWEST,
            Priority::NORMAL,
            Priority::HIGH,
            Priority::BELOW_NORMAL,
            Priority::HIGHEST,
            Priority::LOW,
            Priority::ABOVE_NORMAL,
        ];
        ranks.sort();

        assert_eq!(
            ranks,
            [
                Priority::HIGHEST,
                Priority::HIGH,
                Priority::ABOVE_NORMAL,
                Priority::NORMAL,
                Priority::BELOW_NORMAL,
                Priority::LOW,
                Priority::LOWEST,
            ]
        );
        assert_eq!(Priority::default(), Priority::NORMAL);
        assert_eq!(Priority(5).to_string(), "5");
    }
}
