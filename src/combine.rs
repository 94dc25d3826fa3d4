use std::time::Duration;

/// An associative merge of two values into one.
///
/// The collector folds per-producer contributions into a running total with
/// `acc.combine(contribution)`. The operation must be associative; if it is
/// not commutative, the order in which different producers' contributions are
/// folded is unspecified and must not be relied upon. `Default` provides the
/// identity value that drained slots and accumulators are reset to.
pub trait Combine: Default {
    /// Merges `other` into `self`.
    fn combine(&mut self, other: Self);
}

macro_rules! combine_int {
    ($($t:ty)*) => {
        $(
            impl Combine for $t {
                // Wrapping keeps combination total; callers counting past the
                // type's range want a wider accumulator anyway.
                fn combine(&mut self, other: Self) {
                    *self = self.wrapping_add(other);
                }
            }
        )*
    };
}

combine_int!(u8 u16 u32 u64 u128 usize i8 i16 i32 i64 i128 isize);

macro_rules! combine_float {
    ($($t:ty)*) => {
        $(
            impl Combine for $t {
                fn combine(&mut self, other: Self) {
                    *self += other;
                }
            }
        )*
    };
}

combine_float!(f32 f64);

impl Combine for () {
    fn combine(&mut self, (): Self) {}
}

impl Combine for Duration {
    fn combine(&mut self, other: Self) {
        *self += other;
    }
}

impl<T> Combine for Vec<T> {
    fn combine(&mut self, mut other: Self) {
        self.append(&mut other);
    }
}

impl Combine for String {
    fn combine(&mut self, other: Self) {
        self.push_str(&other);
    }
}

impl<A: Combine, B: Combine> Combine for (A, B) {
    fn combine(&mut self, other: Self) {
        self.0.combine(other.0);
        self.1.combine(other.1);
    }
}

#[cfg(test)]
mod tests {
    use super::Combine;

    #[test]
    fn integers_wrap() {
        let mut acc = u8::MAX;
        acc.combine(2);
        assert_eq!(acc, 1);
    }

    #[test]
    fn pairs_combine_pointwise() {
        // (count, sum) is the classic averaging accumulator.
        let mut acc = (2u64, 30i64);
        acc.combine((1, -10));
        assert_eq!(acc, (3, 20));
    }

    #[test]
    fn vectors_concatenate() {
        let mut acc = vec![1, 2];
        acc.combine(vec![3]);
        assert_eq!(acc, [1, 2, 3]);
    }
}
