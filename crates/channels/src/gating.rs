use {mirror_common::Author, mirror_config::AuthorRule};

/// Check whether a route accepts messages from `author`.
///
/// A present allow list requires at least one matching rule; any matching
/// deny rule excludes the author. Absent lists impose nothing, while an empty
/// allow list admits no one.
pub fn is_author_permitted(
    author: &Author,
    allow: Option<&[AuthorRule]>,
    deny: Option<&[AuthorRule]>,
) -> bool {
    let id = author.id.to_string();
    let matches = |rule: &AuthorRule| rule.matches(&id, author.bot);

    if let Some(allow) = allow
        && !allow.iter().any(matches)
    {
        return false;
    }
    if let Some(deny) = deny
        && deny.iter().any(matches)
    {
        return false;
    }
    true
}
