use proc_macro2::{TokenStream, TokenTree};
use quote::{ToTokens, quote};
use syn::{BinOp, Expr, ExprClosure, Ident, Member, Pat, UnOp};

/// Closure parameter standing for a record.
pub(crate) struct Param {
    ident: Ident,
    side: TokenStream,
}

pub(crate) fn decode_params(closure: &ExprClosure) -> Vec<Param> {
    let idents = closure
        .inputs
        .iter()
        .map(|input| match input {
            Pat::Ident(v) => v.ident.clone(),
            Pat::Type(v) => match v.pat.as_ref() {
                Pat::Ident(v) => v.ident.clone(),
                _ => panic!("Predicate parameters must be plain identifiers"),
            },
            _ => panic!("Predicate parameters must be plain identifiers"),
        })
        .collect::<Vec<_>>();
    let sides = match idents.len() {
        1 => vec![quote!(::std::option::Option::None)],
        2 => vec![
            quote!(::std::option::Option::Some(::sluice::Side::Left)),
            quote!(::std::option::Option::Some(::sluice::Side::Right)),
        ],
        _ => panic!("A predicate takes one record, or two for a join condition"),
    };
    idents
        .into_iter()
        .zip(sides)
        .map(|(ident, side)| Param { ident, side })
        .collect()
}

/// True when a parameter is used in `tokens`. Identifiers after `.` or `::` are member,
/// method or path segments and never refer to a parameter.
fn mentions(tokens: TokenStream, params: &[Param]) -> bool {
    let mut segment = false;
    let mut previous = None;
    for token in tokens {
        let punct = match &token {
            TokenTree::Punct(p) => Some(p.as_char()),
            _ => None,
        };
        match token {
            TokenTree::Ident(ident) => {
                if !segment && params.iter().any(|p| p.ident == ident) {
                    return true;
                }
                segment = false;
            }
            // `a.b` and `a::b`, not `a..b` nor `a: b`
            TokenTree::Punct(..) => {
                segment = match (previous, punct) {
                    (Some('.'), Some('.')) => false,
                    (_, Some('.')) => true,
                    (Some(':'), Some(':')) => true,
                    _ => false,
                };
            }
            TokenTree::Group(group) => {
                if mentions(group.stream(), params) {
                    return true;
                }
                segment = false;
            }
            TokenTree::Literal(..) => segment = false,
        }
        previous = punct;
    }
    false
}

fn is_none(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(v) if v.path.is_ident("None"))
}

fn boxed(expr: TokenStream) -> TokenStream {
    quote!(::std::boxed::Box::new(#expr))
}

/// Translates `expr` into a `::sluice::Expr` constructor. Sub-expressions not mentioning any
/// parameter are evaluated where the macro is invoked and captured as values.
pub(crate) fn decode_expression(expr: &Expr, params: &[Param]) -> TokenStream {
    if is_none(expr) {
        return quote!(::sluice::Expr::null());
    }
    if !mentions(expr.to_token_stream(), params) {
        return quote! {
            ::sluice::Expr::Value(::sluice::Value::from(::std::clone::Clone::clone(&(#expr))))
        };
    }
    match expr {
        Expr::Binary(v) => {
            let op = match v.op {
                BinOp::Eq(..) => quote!(Equal),
                BinOp::Ne(..) => quote!(NotEqual),
                BinOp::Lt(..) => quote!(Less),
                BinOp::Le(..) => quote!(LessEqual),
                BinOp::Gt(..) => quote!(Greater),
                BinOp::Ge(..) => quote!(GreaterEqual),
                BinOp::And(..) => quote!(And),
                BinOp::Or(..) => quote!(Or),
                BinOp::Add(..) => quote!(Addition),
                BinOp::Sub(..) => quote!(Subtraction),
                BinOp::Mul(..) => quote!(Multiplication),
                BinOp::Div(..) => quote!(Division),
                BinOp::Rem(..) => quote!(Remainder),
                BinOp::BitAnd(..) => quote!(BitwiseAnd),
                BinOp::BitOr(..) => quote!(BitwiseOr),
                _ => panic!("Unsupported operator `{}`", v.op.to_token_stream()),
            };
            let lhs = boxed(decode_expression(&v.left, params));
            let rhs = boxed(decode_expression(&v.right, params));
            quote! {
                ::sluice::Expr::Binary {
                    op: ::sluice::BinaryOpType::#op,
                    lhs: #lhs,
                    rhs: #rhs,
                }
            }
        }
        Expr::Unary(v) => {
            let op = match v.op {
                UnOp::Not(..) => quote!(Not),
                UnOp::Neg(..) => quote!(Negative),
                UnOp::Deref(..) => return decode_expression(&v.expr, params),
                _ => panic!("Unsupported operator `{}`", v.op.to_token_stream()),
            };
            let arg = boxed(decode_expression(&v.expr, params));
            quote! {
                ::sluice::Expr::Unary {
                    op: ::sluice::UnaryOpType::#op,
                    arg: #arg,
                }
            }
        }
        Expr::Field(v) => {
            let Expr::Path(base) = v.base.as_ref() else {
                panic!(
                    "Only direct members of the record can be used, found `{}`",
                    expr.to_token_stream()
                );
            };
            let Some(param) = params.iter().find(|p| base.path.is_ident(&p.ident)) else {
                panic!("Unknown record `{}`", base.to_token_stream());
            };
            let member = match &v.member {
                Member::Named(ident) => ident.to_string(),
                Member::Unnamed(index) => index.index.to_string(),
            };
            let side = &param.side;
            quote! {
                ::sluice::Expr::Column {
                    member: ::std::borrow::Cow::Borrowed(#member),
                    side: #side,
                }
            }
        }
        Expr::MethodCall(v) => {
            let method = v.method.to_string();
            let receiver_mentions = mentions(v.receiver.to_token_stream(), params);
            if method == "contains" && !receiver_mentions && v.args.len() == 1 {
                let target = boxed(decode_expression(&v.args[0], params));
                let collection = decode_expression(&v.receiver, params);
                return quote! {
                    ::sluice::Expr::Call {
                        method: ::std::borrow::Cow::Borrowed("is_in"),
                        target: #target,
                        args: ::std::vec![#collection],
                    }
                };
            }
            let target = boxed(decode_expression(&v.receiver, params));
            let args = v.args.iter().map(|a| decode_expression(a, params));
            quote! {
                ::sluice::Expr::Call {
                    method: ::std::borrow::Cow::Borrowed(#method),
                    target: #target,
                    args: ::std::vec![#(#args),*],
                }
            }
        }
        Expr::If(v) => {
            let Some((_, otherwise)) = &v.else_branch else {
                panic!("A conditional inside a predicate needs an `else` branch");
            };
            let [syn::Stmt::Expr(then, None)] = v.then_branch.stmts.as_slice() else {
                panic!("The branches of a conditional must be single expressions");
            };
            let otherwise = match otherwise.as_ref() {
                Expr::Block(block) => match block.block.stmts.as_slice() {
                    [syn::Stmt::Expr(e, None)] => e,
                    _ => panic!("The branches of a conditional must be single expressions"),
                },
                other => other,
            };
            let condition = boxed(decode_expression(&v.cond, params));
            let then = boxed(decode_expression(then, params));
            let otherwise = boxed(decode_expression(otherwise, params));
            quote! {
                ::sluice::Expr::Conditional {
                    condition: #condition,
                    then: #then,
                    otherwise: #otherwise,
                }
            }
        }
        Expr::Index(v) => {
            let target = boxed(decode_expression(&v.expr, params));
            let index = boxed(decode_expression(&v.index, params));
            quote! {
                ::sluice::Expr::Index {
                    target: #target,
                    index: #index,
                }
            }
        }
        Expr::Paren(v) => decode_expression(&v.expr, params),
        Expr::Group(v) => decode_expression(&v.expr, params),
        Expr::Reference(v) => decode_expression(&v.expr, params),
        Expr::Path(..) => panic!(
            "The record `{}` cannot be used as a value, use one of its members",
            expr.to_token_stream()
        ),
        _ => panic!("Unexpected expression `{}`", expr.to_token_stream()),
    }
}
