use convert_case::{Case, Casing};
use quote::ToTokens;
use syn::{
    Field, GenericArgument, Ident, LitStr, Path, PathArguments, Type, TypePath, parse::ParseBuffer,
};

pub(crate) struct FieldMetadata {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    pub(crate) column: Option<String>,
    pub(crate) result_only: bool,
    pub(crate) auto_increment: bool,
    /// Record type of a child collection, with whether the collection is optional.
    pub(crate) child: Option<(Type, bool)>,
    pub(crate) foreign_key: Option<String>,
    pub(crate) converter: Option<Path>,
}

/// The single generic argument of `wrapper<T>`.
fn generic_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(TypePath { qself: None, path }) = ty else {
        return None;
    };
    let segment = path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };
    match arguments.args.first()? {
        GenericArgument::Type(ty) if arguments.args.len() == 1 => Some(ty),
        _ => None,
    }
}

/// `Vec<C>` or `Option<Vec<C>>`.
fn decode_child(ty: &Type) -> Option<(Type, bool)> {
    if let Some(inner) = generic_argument(ty, "Vec") {
        return Some((inner.clone(), false));
    }
    let inner = generic_argument(ty, "Option")?;
    generic_argument(inner, "Vec").map(|v| (v.clone(), true))
}

pub(crate) fn decode_field(field: &Field, rename_all: Option<Case>) -> FieldMetadata {
    let ident = field
        .ident
        .clone()
        .expect("Entity fields are expected to have a name");
    let mut metadata = FieldMetadata {
        column: rename_all.map(|case| ident.to_string().trim_start_matches('_').to_case(case)),
        ident,
        ty: field.ty.clone(),
        result_only: false,
        auto_increment: false,
        child: None,
        foreign_key: None,
        converter: None,
    };
    for attr in &field.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("sluice") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!("Error while parsing `sluice`, use it like: `#[sluice(attribute = value, ..)]`");
        };
        let _ = list.parse_nested_meta(|arg| {
            if arg.path.is_ident("name") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `name`, use it like: `#[sluice(name = \"ColumnName\")]`");
                };
                metadata.column = Some(value.value());
            } else if arg.path.is_ident("result") {
                let Err(..) = arg.value() else {
                    panic!("Error while parsing `result`, use it like: `#[sluice(result)]`");
                };
                metadata.result_only = true;
            } else if arg.path.is_ident("auto_increment") {
                let Err(..) = arg.value() else {
                    panic!("Error while parsing `auto_increment`, use it like: `#[sluice(auto_increment)]`");
                };
                metadata.auto_increment = true;
            } else if arg.path.is_ident("child") {
                let Err(..) = arg.value() else {
                    panic!("Error while parsing `child`, use it like: `#[sluice(child)]`");
                };
                let Some(child) = decode_child(&metadata.ty) else {
                    panic!(
                        "Child field `{}` must be a `Vec<Record>` or an `Option<Vec<Record>>`",
                        metadata.ident
                    );
                };
                metadata.child = Some(child);
            } else if arg.path.is_ident("foreign_key") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `foreign_key`, use it like: `#[sluice(foreign_key = \"ParentID\")]`");
                };
                metadata.foreign_key = Some(value.value());
            } else if arg.path.is_ident("converter") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<Path>) else {
                    panic!("Error while parsing `converter`, use it like: `#[sluice(converter = path::to::function)]`");
                };
                metadata.converter = Some(value);
            } else {
                panic!(
                    "Unknown attribute `{}` inside sluice macro",
                    arg.path.to_token_stream()
                );
            }
            Ok(())
        });
    }
    if metadata.foreign_key.is_some() && metadata.child.is_none() {
        panic!(
            "`foreign_key` on field `{}` requires `child`, on plain columns declare it on the struct",
            metadata.ident
        );
    }
    metadata
}
