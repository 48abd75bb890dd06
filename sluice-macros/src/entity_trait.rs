use crate::decode_table::TableMetadata;
use proc_macro2::TokenStream;
use quote::quote;

fn option_str(value: &Option<String>) -> TokenStream {
    match value {
        Some(v) => quote!(::std::option::Option::Some(#v)),
        None => quote!(::std::option::Option::None),
    }
}

pub(crate) fn entity_trait(table: &TableMetadata) -> TokenStream {
    let name = &table.item.ident;
    let type_name = name.to_string();
    let table_name = option_str(&table.table);
    let primary_key = option_str(&table.primary_key);
    let foreign_key = option_str(&table.foreign_key);
    let auto_increment = match table.auto_increment {
        Some(v) => quote!(::std::option::Option::Some(#v)),
        None => quote!(::std::option::Option::None),
    };
    let fields = table.fields.iter().map(|f| {
        let field = f.ident.to_string();
        let column = option_str(&f.column);
        let result_only = f.result_only;
        let auto_increment = f.auto_increment;
        let foreign_key = option_str(&f.foreign_key);
        let (prototype, child) = match &f.child {
            Some((child, _)) => (
                quote!(::sluice::Value::Null),
                quote!(::std::option::Option::Some(::sluice::EntityType::of::<#child>())),
            ),
            None => {
                let ty = &f.ty;
                (
                    quote!(<#ty as ::sluice::AsValue>::as_empty_value()),
                    quote!(::std::option::Option::None),
                )
            }
        };
        let converter = match &f.converter {
            Some(path) => quote!(::std::option::Option::Some(#path as ::sluice::Converter)),
            None => quote!(::std::option::Option::None),
        };
        quote! {
            ::sluice::FieldMapping {
                field: #field,
                column: #column,
                prototype: #prototype,
                result_only: #result_only,
                auto_increment: #auto_increment,
                child: #child,
                foreign_key: #foreign_key,
                converter: #converter,
            }
        }
    });
    let values = table.fields.iter().enumerate().map(|(i, f)| {
        let ident = &f.ident;
        if f.child.is_some() {
            quote!(#i => ::sluice::Value::Null,)
        } else {
            quote!(#i => ::sluice::AsValue::as_value(::std::clone::Clone::clone(&self.#ident)),)
        }
    });
    let setters = table
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.child.is_none())
        .map(|(i, f)| {
            let ident = &f.ident;
            quote!(#i => self.#ident = ::sluice::AsValue::try_from_value(value)?,)
        });
    let children = table.fields.iter().enumerate().filter_map(|(i, f)| {
        let ident = &f.ident;
        let (_, optional) = f.child.as_ref()?;
        Some(if *optional {
            quote!(#i => self.#ident.as_deref().map(::sluice::ChildRows::of),)
        } else {
            quote!(#i => ::std::option::Option::Some(::sluice::ChildRows::of(&self.#ident)),)
        })
    });
    let count = table.fields.len();
    quote! {
        impl ::sluice::Entity for #name {
            fn mapping() -> ::sluice::TableMapping {
                ::sluice::TableMapping {
                    type_name: #type_name,
                    table: #table_name,
                    primary_key: #primary_key,
                    auto_increment: #auto_increment,
                    foreign_key: #foreign_key,
                    fields: ::std::vec![#(#fields),*],
                }
            }

            fn value(&self, field: usize) -> ::sluice::Value {
                match field {
                    #(#values)*
                    _ => ::sluice::Value::Null,
                }
            }

            fn set_value(&mut self, field: usize, value: ::sluice::Value) -> ::sluice::Result<()> {
                match field {
                    #(#setters)*
                    _ => {}
                }
                Ok(())
            }

            fn children(&self, field: usize) -> ::std::option::Option<::sluice::ChildRows> {
                match field {
                    #(#children)*
                    _ => ::std::option::Option::None,
                }
            }

            fn row(&self) -> ::sluice::Row {
                (0..#count).map(|i| ::sluice::Entity::value(self, i)).collect()
            }
        }
    }
}
