use indexmap::IndexMap;
use serde_json::Value;

/// Overlays a partial document onto a base document.
///
/// Strings overwrite when the patch side is non-empty, booleans always
/// overwrite, lists append, and maps patch shared keys recursively while
/// taking the entries only the patch side has.
pub trait Patch {
    fn patch(&mut self, other: &Self);
}

impl Patch for String {
    fn patch(&mut self, other: &Self) {
        if !other.is_empty() {
            self.clone_from(other);
        }
    }
}

impl Patch for bool {
    fn patch(&mut self, other: &Self) {
        *self = *other;
    }
}

impl Patch for Value {
    fn patch(&mut self, other: &Self) {
        if other.is_null() {
            return;
        }
        if let (Value::Object(base), Value::Object(overlay)) = (&mut *self, other) {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => existing.patch(value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
            return;
        }
        *self = other.clone();
    }
}

impl<T: Patch + Clone> Patch for IndexMap<String, T> {
    fn patch(&mut self, other: &Self) {
        for (key, value) in other {
            match self.get_mut(key) {
                Some(existing) => existing.patch(value),
                None => {
                    self.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

impl<T: Patch + Clone> Patch for Option<T> {
    fn patch(&mut self, other: &Self) {
        let Some(overlay) = other else {
            return;
        };
        match self {
            Some(base) => base.patch(overlay),
            None => *self = Some(overlay.clone()),
        }
    }
}

/// Non-empty patch strings overwrite.
pub fn patch_string(base: &mut Option<String>, other: &Option<String>) {
    if let Some(value) = other {
        if !value.is_empty() {
            *base = Some(value.clone());
        }
    }
}

/// Scalars other than strings overwrite when set on the patch side.
pub fn patch_scalar<T: Clone>(base: &mut Option<T>, other: &Option<T>) {
    if other.is_some() {
        base.clone_from(other);
    }
}

/// Appends the patch list to the base list.
pub fn patch_list<T: Clone>(base: &mut Vec<T>, other: &[T]) {
    base.extend_from_slice(other);
}

/// Appends only items the base does not contain yet.
pub fn patch_set<T: Clone + PartialEq>(base: &mut Vec<T>, other: &[T]) {
    for item in other {
        if !base.contains(item) {
            base.push(item.clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_patch() {
        let mut base = String::from("foo");
        base.patch(&String::new());
        assert_eq!(base, "foo");
        base.patch(&String::from("bar"));
        assert_eq!(base, "bar");
    }

    #[test]
    fn test_map_patch_is_recursive() {
        let mut base: IndexMap<String, Value> = IndexMap::new();
        base.insert("a".into(), json!({"x": 1}));
        let mut other: IndexMap<String, Value> = IndexMap::new();
        other.insert("a".into(), json!({"y": 2}));
        other.insert("b".into(), json!(true));
        base.patch(&other);
        assert_eq!(base["a"], json!({"x": 1, "y": 2}));
        assert_eq!(base["b"], json!(true));
        assert_eq!(base.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_list_patch_appends() {
        let mut base = vec![1, 2];
        patch_list(&mut base, &[2, 3]);
        assert_eq!(base, vec![1, 2, 2, 3]);
        let mut base = vec![1, 2];
        patch_set(&mut base, &[2, 3]);
        assert_eq!(base, vec![1, 2, 3]);
    }

    #[test]
    fn test_option_patch() {
        let mut base: Option<String> = None;
        base.patch(&Some("x".to_string()));
        assert_eq!(base.as_deref(), Some("x"));
        base.patch(&None);
        assert_eq!(base.as_deref(), Some("x"));
    }
}
