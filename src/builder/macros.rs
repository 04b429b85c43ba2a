//! Macros for ergonomic state machine construction.

/// Generate a state enum together with its `State` trait implementation.
///
/// The enum derives everything the engine needs (`Copy`, `Eq`, `Hash`,
/// serde) and gets an associated `ALL` constant listing every variant in
/// declaration order.
///
/// # Example
///
/// ```
/// use thermal_fsm::state_enum;
/// use thermal_fsm::core::State;
///
/// state_enum! {
///     pub enum FanState {
///         Off,
///         SpinningUp,
///         Running,
///         Stalled,
///     }
///     final: [Stalled]
///     error: [Stalled]
/// }
///
/// assert_eq!(FanState::ALL.len(), 4);
/// assert_eq!(FanState::SpinningUp.name(), "SpinningUp");
/// assert!(FanState::Stalled.is_error());
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }

        $(final: [$($final:ident),* $(,)?])?
        $(error: [$($error:ident),* $(,)?])?
    ) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            Debug,
            serde::Serialize,
            serde::Deserialize
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $name {
            /// Every variant, in declaration order.
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$($name::$variant),*];
        }

        impl $crate::core::State for $name {
            fn name(&self) -> &str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }

            fn is_final(&self) -> bool {
                match self {
                    $($(Self::$final => true,)*)?
                    #[allow(unreachable_patterns)]
                    _ => false,
                }
            }

            fn is_error(&self) -> bool {
                match self {
                    $($(Self::$error => true,)*)?
                    #[allow(unreachable_patterns)]
                    _ => false,
                }
            }
        }
    };
}
