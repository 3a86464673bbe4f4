//! Testing utilities shared by the shapeflow crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Table-driven tests.
///
/// Define a `Debug` struct, conventionally named `Case`, describing one test
/// case, build a collection of cases and call `test_each` with the body of
/// the test. Every case is run even if earlier ones fail. Afterwards the
/// test panics with the debug representation of each failed case.
///
/// ```
/// use shapeflow_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     rank: usize,
///     expected_len: usize,
/// }
///
/// let cases = [Case { rank: 2, expected_len: 2 }];
/// cases.test_each(|case| {
///     assert_eq!(vec![0; case.rank].len(), case.expected_len);
/// });
/// ```
///
/// Cases and values captured by the test function must be unwind safe. Wrap
/// values with interior mutability in
/// [`AssertUnwindSafe`](std::panic::AssertUnwindSafe), or create them inside
/// the test function.
pub trait TestCases {
    type Case;

    /// Run `test` with a reference to each case.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Run `test` with each case passed by value.
    ///
    /// The case is formatted before the test runs so that it can be reported
    /// if the test fails.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + RefUnwindSafe,
    {
        let failures: Vec<String> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .map(|case| format!("{:?}", case))
            .collect();
        report(failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<String> = self
            .into_iter()
            .filter_map(|case| {
                let desc = format!("{:?}", case);
                std::panic::catch_unwind(move || test(case))
                    .err()
                    .map(|_| desc)
            })
            .collect();
        report(failures);
    }
}

fn report(failures: Vec<String>) {
    if !failures.is_empty() {
        panic!(
            "{} test cases failed:\n{}",
            failures.len(),
            failures.join("\n")
        );
    }
}
