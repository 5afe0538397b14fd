use serde::{Deserialize, Serialize};

/// An optional field that distinguishes "not specified" from an explicit
/// null, so bean serialization can omit unset values while round-tripping
/// explicit ones.
#[derive(Default, Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NoneOrOne<T> {
    #[serde(skip_deserializing)]
    #[default]
    Unspecified,
    None,
    One(T),
}

impl<T> NoneOrOne<T> {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, NoneOrOne::Unspecified)
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            NoneOrOne::One(item) => Some(item),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            NoneOrOne::One(item) => Some(item),
            _ => None,
        }
    }
}

/// A field that accepts a single value or a list of values.
#[derive(Default, Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NoneOrSome<T> {
    #[serde(skip_deserializing)]
    #[default]
    Unspecified,
    None,
    One(T),
    Some(Vec<T>),
}

impl<T> NoneOrSome<T> {
    pub fn is_empty(&self) -> bool {
        match self {
            NoneOrSome::Unspecified => true,
            NoneOrSome::None => true,
            NoneOrSome::One(_) => false,
            NoneOrSome::Some(v) => v.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NoneOrSome::Unspecified | NoneOrSome::None => 0,
            NoneOrSome::One(_) => 1,
            NoneOrSome::Some(v) => v.len(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            NoneOrSome::Unspecified | NoneOrSome::None => vec![],
            NoneOrSome::One(item) => vec![item],
            NoneOrSome::Some(v) => v,
        }
    }

    pub fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = &'a T> + 'a> {
        match self {
            NoneOrSome::Unspecified | NoneOrSome::None => Box::new(std::iter::empty()),
            NoneOrSome::One(item) => Box::new(std::iter::once(item)),
            NoneOrSome::Some(v) => Box::new(v.iter()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_or_some_single_value() {
        let parsed: NoneOrSome<String> = serde_yaml::from_str("h3").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.into_vec(), vec!["h3".to_string()]);
    }

    #[test]
    fn test_none_or_some_list() {
        let parsed: NoneOrSome<String> = serde_yaml::from_str("[h2, h3]").unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_none_or_some_default_is_empty() {
        let v: NoneOrSome<String> = NoneOrSome::default();
        assert!(v.is_empty());
        assert_eq!(v.iter().count(), 0);
    }

    #[test]
    fn test_none_or_one_into_option() {
        assert_eq!(NoneOrOne::One(5).into_option(), Some(5));
        assert_eq!(NoneOrOne::<u32>::None.into_option(), None);
        assert_eq!(NoneOrOne::<u32>::Unspecified.into_option(), None);
    }
}
