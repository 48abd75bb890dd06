use proc_macro2::TokenStream;
use quote::quote;
use syn::{Fields, ItemEnum};

/// Fieldless enum stored as its discriminant.
pub(crate) fn value_enum(item: &ItemEnum) -> TokenStream {
    let name = &item.ident;
    let type_name = name.to_string();
    let variants = item
        .variants
        .iter()
        .map(|v| {
            if !matches!(v.fields, Fields::Unit) {
                panic!(
                    "ValueEnum variant `{name}::{}` cannot have fields, only fieldless enums map to an integral column",
                    v.ident
                );
            }
            &v.ident
        })
        .collect::<Vec<_>>();
    quote! {
        impl ::sluice::AsValue for #name {
            fn as_empty_value() -> ::sluice::Value {
                ::sluice::Value::Int32(None)
            }

            fn as_value(self) -> ::sluice::Value {
                ::sluice::Value::Int32(Some(self as i32))
            }

            fn try_from_value(value: ::sluice::Value) -> ::sluice::Result<Self> {
                let discriminant = <i64 as ::sluice::AsValue>::try_from_value(value)?;
                #(
                    if discriminant == #name::#variants as i64 {
                        return Ok(#name::#variants);
                    }
                )*
                Err(::sluice::Error::msg(format!(
                    "`{discriminant}` is not a discriminant of {}",
                    #type_name
                )))
            }
        }
    }
}
