use std::fmt;

use tracing::warn;

/// A location in the app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Route {
    /// `/products`: the list and the create form.
    #[default]
    Products,
    /// `/products/:id`. The id is `None` when the path has no id segment.
    Product(Option<String>),
    /// `/login`
    Login,
    /// `/register`
    Register,
}

impl Route {
    /// Maps a path to its route. Unknown paths fall back to the product list.
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match segments.as_slice() {
            [""] | ["products"] => Self::Products,
            ["products", ""] => Self::Product(None),
            ["products", id] | ["products", id, ""] => Self::Product(Some((*id).to_string())),
            ["login"] | ["login", ""] => Self::Login,
            ["register"] | ["register", ""] => Self::Register,
            _ => {
                warn!(path, "unknown route, showing products");
                Self::Products
            }
        }
    }

    /// The canonical path of this route.
    pub fn path(&self) -> String {
        match self {
            Self::Products => "/products".to_string(),
            Self::Product(Some(id)) => format!("/products/{id}"),
            Self::Product(None) => "/products/".to_string(),
            Self::Login => "/login".to_string(),
            Self::Register => "/register".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
