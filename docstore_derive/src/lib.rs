use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Type, parse_macro_input};

/// Implements `docstore::EmbeddedDocument` for a serde struct.
///
/// The bookkeeping field is the one marked `#[embed_state]`, or else the
/// single field of type `EmbedState`.
#[proc_macro_derive(Embedded, attributes(embed_state))]
pub fn derive_embedded(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_embedded(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_embedded(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Embedded can only be derived for structs",
            ));
        }
    };

    let named_fields = match &data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Embedded requires named fields",
            ));
        }
    };

    let fields: Vec<&Field> = named_fields.named.iter().collect();
    let state_field = find_state_field(&fields).ok_or_else(|| {
        syn::Error::new(
            struct_name.span(),
            "Embedded requires an `EmbedState` field, marked with #[embed_state] when ambiguous",
        )
    })??;
    let state_ident = &state_field.ident;

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docstore::embedding::EmbeddedDocument for #struct_name #ty_generics #where_clause {
            fn embed_state(&self) -> &::docstore::embedding::EmbedState {
                &self.#state_ident
            }

            fn embed_state_mut(&mut self) -> &mut ::docstore::embedding::EmbedState {
                &mut self.#state_ident
            }
        }
    })
}

fn find_state_field<'a>(fields: &[&'a Field]) -> Option<syn::Result<&'a Field>> {
    let marked: Vec<&Field> = fields
        .iter()
        .copied()
        .filter(|field| field.attrs.iter().any(|attr| attr.path().is_ident("embed_state")))
        .collect();
    if marked.len() > 1 {
        return Some(Err(syn::Error::new_spanned(
            &marked[1].ident,
            "only one field can be marked #[embed_state]",
        )));
    }
    if let Some(field) = marked.first() {
        return Some(Ok(*field));
    }

    let typed: Vec<&Field> = fields
        .iter()
        .copied()
        .filter(|field| is_embed_state_type(&field.ty))
        .collect();
    match typed.as_slice() {
        [field] => Some(Ok(*field)),
        [] => None,
        [_, second, ..] => Some(Err(syn::Error::new_spanned(
            &second.ident,
            "several EmbedState fields, mark one with #[embed_state]",
        ))),
    }
}

fn is_embed_state_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "EmbedState"),
        _ => false,
    }
}
