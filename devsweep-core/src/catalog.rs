use std::collections::HashMap;
use std::sync::LazyLock;

/// Directory basenames recognized as cleanup targets, with a human-readable category.
const ENTRIES: &[(&str, &str)] = &[
    ("node_modules", "Node.js/Bun.js dependencies"),
    (".next", "Next.js build cache"),
    ("dist", "Distribution/build files"),
    (".nuxt", "Nuxt.js build cache"),
    (".output", "Nuxt 3 output"),
    (".cache", "Cache directory"),
    ("coverage", "Test coverage reports"),
    (".nyc_output", "NYC test coverage"),
    ("tmp", "Temporary files"),
    ("temp", "Temporary files"),
    (".parcel-cache", "Parcel bundler cache"),
    (".turbo", "Turborepo cache"),
    (".webpack", "Webpack cache"),
    (".rollup.cache", "Rollup cache"),
    (".vite", "Vite cache"),
    (".swc", "SWC cache"),
    ("lib-cov", "Library coverage"),
    (".DS_Store", "macOS metadata"),
    ("Thumbs.db", "Windows metadata"),
];

static CATALOG: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| ENTRIES.iter().copied().collect());

/// Category label used when a name has no catalog entry
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Check whether a basename is a known cleanup target
pub fn is_cleanup_target(name: &str) -> bool {
    CATALOG.contains_key(name)
}

/// Get the category for a basename, if it is a known cleanup target
pub fn category_of(name: &str) -> Option<&'static str> {
    CATALOG.get(name).copied()
}

/// Get the category for a basename, falling back to [`UNKNOWN_CATEGORY`]
pub fn category_or_unknown(name: &str) -> &'static str {
    category_of(name).unwrap_or(UNKNOWN_CATEGORY)
}

/// All catalog entries in declaration order
pub fn entries() -> impl Iterator<Item = (&'static str, &'static str)> {
    ENTRIES.iter().copied()
}
