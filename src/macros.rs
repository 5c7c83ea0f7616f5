/// Declares an NCID token enum: each variant is paired with the exact
/// upper-case string the gateway sends, e.g. `Cid => "CID"`.
///
/// Parsing is an exact string match. `"cid"` is not a command, so unknown or
/// mis-cased tokens land in `$Err`, a tuple struct over the rejected text
/// that the calling module declares itself.
///
/// ```ignore
/// define_wire_enum! {
///     error_type: ParseFieldNameError,
///     pub enum FieldName {
///         Number => "NMBR",
///         Name => "NAME",
///     }
/// }
/// ```
macro_rules! define_wire_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Wire-format token.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok($Name::$variant), )+
                    _ => Err($Err(s.to_string())),
                }
            }
        }
    };
}
