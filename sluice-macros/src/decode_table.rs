use crate::decode_field::{FieldMetadata, decode_field};
use convert_case::Case;
use quote::ToTokens;
use syn::{ItemStruct, LitBool, LitStr, parse::ParseBuffer};

pub(crate) struct TableMetadata {
    pub(crate) item: ItemStruct,
    pub(crate) table: Option<String>,
    pub(crate) primary_key: Option<String>,
    pub(crate) auto_increment: Option<bool>,
    pub(crate) foreign_key: Option<String>,
    pub(crate) fields: Vec<FieldMetadata>,
}

fn decode_case(value: &str) -> Case {
    match value {
        "snake_case" => Case::Snake,
        "camelCase" => Case::Camel,
        "PascalCase" => Case::Pascal,
        "SCREAMING_SNAKE_CASE" => Case::UpperSnake,
        "lowercase" => Case::Flat,
        "UPPERCASE" => Case::UpperFlat,
        _ => panic!(
            "Unknown case `{value}`, expected one of: snake_case, camelCase, PascalCase, SCREAMING_SNAKE_CASE, lowercase, UPPERCASE"
        ),
    }
}

pub(crate) fn decode_table(item: ItemStruct) -> TableMetadata {
    let mut table = None;
    let mut primary_key = None;
    let mut auto_increment = None;
    let mut foreign_key = None;
    let mut rename_all = None;
    for attr in &item.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("sluice") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!("Error while parsing `sluice`, use it like: `#[sluice(attribute = value, ..)]`");
        };
        let _ = list.parse_nested_meta(|arg| {
            if arg.path.is_ident("table") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `table`, use it like: `#[sluice(table = \"FD_Table\")]`");
                };
                table = Some(value.value());
            } else if arg.path.is_ident("primary_key") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `primary_key`, use it like: `#[sluice(primary_key = \"ID\")]`");
                };
                primary_key = Some(value.value());
            } else if arg.path.is_ident("auto_increment") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitBool>) else {
                    panic!("Error while parsing `auto_increment`, use it like: `#[sluice(auto_increment = false)]`");
                };
                auto_increment = Some(value.value());
            } else if arg.path.is_ident("foreign_key") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `foreign_key`, use it like: `#[sluice(foreign_key = \"ParentID\")]`");
                };
                foreign_key = Some(value.value());
            } else if arg.path.is_ident("rename_all") {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!("Error while parsing `rename_all`, use it like: `#[sluice(rename_all = \"PascalCase\")]`");
                };
                rename_all = Some(decode_case(&value.value()));
            } else {
                panic!(
                    "Unknown attribute `{}` inside sluice macro",
                    arg.path.to_token_stream()
                );
            }
            Ok(())
        });
    }
    let fields = item
        .fields
        .iter()
        .map(|f| decode_field(f, rename_all))
        .collect();
    TableMetadata {
        item,
        table,
        primary_key,
        auto_increment,
        foreign_key,
        fields,
    }
}
