//! Type shape helpers.

fn single_generic<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let seg = type_path.path.segments.last()?;
    if seg.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    let syn::GenericArgument::Type(inner) = args.args.first()? else {
        return None;
    };
    Some(inner)
}

/// `T` of `Option<T>` (any path ending in `Option`).
pub(crate) fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_generic(ty, "Option")
}

/// `T` of `Vec<T>`.
pub(crate) fn vec_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_generic(ty, "Vec")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_wrappers() {
        let ty: syn::Type = syn::parse_quote!(Option<Box<Radio>>);
        assert!(option_inner(&ty).is_some());
        assert!(vec_inner(&ty).is_none());

        let ty: syn::Type = syn::parse_quote!(std::vec::Vec<Tag>);
        assert!(vec_inner(&ty).is_some());

        let ty: syn::Type = syn::parse_quote!(i64);
        assert!(option_inner(&ty).is_none());
    }
}
