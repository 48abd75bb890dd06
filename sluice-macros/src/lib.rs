mod decode_expression;
mod decode_field;
mod decode_table;
mod entity_trait;
mod value_enum;

use decode_expression::{decode_expression, decode_params};
use decode_table::decode_table;
use entity_trait::entity_trait;
use proc_macro::TokenStream;
use syn::{ExprClosure, ItemEnum, ItemStruct, parse_macro_input};
use value_enum::value_enum;

/// Maps a struct to a table.
///
/// Struct attributes: `#[sluice(table = "..", primary_key = "..", auto_increment = bool,
/// foreign_key = "..", rename_all = "PascalCase")]`.
///
/// Field attributes: `#[sluice(name = "..", result, child, auto_increment,
/// foreign_key = "..", converter = path)]`. A `child` field is a `Vec<Record>` or an
/// `Option<Vec<Record>>`.
#[proc_macro_derive(Entity, attributes(sluice))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let table = decode_table(parse_macro_input!(input as ItemStruct));
    entity_trait(&table).into()
}

/// Stores a fieldless enum as its integral discriminant.
#[proc_macro_derive(ValueEnum)]
pub fn derive_value_enum(input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemEnum);
    value_enum(&item).into()
}

/// Builds a predicate tree from closure syntax.
///
/// `expr!(|r| r.code.starts_with("AB") && !r.deleted)` describes a condition on one record,
/// `expr!(|l, r| l.id == r.parent_id)` a join condition between two.
#[proc_macro]
pub fn expr(input: TokenStream) -> TokenStream {
    let closure = parse_macro_input!(input as ExprClosure);
    let params = decode_params(&closure);
    decode_expression(&closure.body, &params).into()
}
