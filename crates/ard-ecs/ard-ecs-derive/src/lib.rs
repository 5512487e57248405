use proc_macro::TokenStream;
use quote::quote;

/// Implements `Component` for a type. The `Component` trait must be in scope.
///
/// Mark the type with `#[enableable]` to give it a per-entity enable bit.
#[proc_macro_derive(Component, attributes(enableable))]
pub fn component(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();
    impl_component(&ast)
}

fn impl_component(ast: &syn::DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let enableable = ast
        .attrs
        .iter()
        .any(|attr| attr.path.is_ident("enableable"));

    let gen = quote! {
        impl #impl_generics Component for #name #ty_generics #where_clause {
            const NAME: &'static str = #name_str;
            const ENABLEABLE: bool = #enableable;
        }
    };
    gen.into()
}
