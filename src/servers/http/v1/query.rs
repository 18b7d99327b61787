//! The `Query` struct used to parse and store the URL query parameters.
//!
//! Values are kept exactly as they appear in the query string; binary params
//! like `info_hash` stay percent encoded until a request type decodes them.
use std::panic::Location;
use std::str::FromStr;

use multimap::MultiMap;
use thiserror::Error;

type ParamName = String;
type ParamValue = String;

/// A URL query component: an ordered multimap of `name=value` params.
#[derive(Debug)]
pub struct Query {
    params: MultiMap<ParamName, NameValuePair>,
}

impl Query {
    /// The first value of the param with the given name, if present.
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<String> {
        self.params.get(name).map(|pair| pair.value.clone())
    }

    /// All values of the param with the given name.
    #[must_use]
    pub fn get_param_vec(&self, name: &str) -> Option<Vec<String>> {
        self.params
            .get_vec(name)
            .map(|pairs| pairs.iter().map(|pair| pair.value.clone()).collect())
    }

    /// All params as `(name, values)` pairs.
    #[must_use]
    pub fn all_params(&self) -> Vec<(String, Vec<String>)> {
        self.params
            .iter_all()
            .map(|(name, pairs)| (name.clone(), pairs.iter().map(|pair| pair.value.clone()).collect()))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// This error can be returned when parsing a [`Query`] from a string.
#[derive(Error, Debug)]
pub enum ParseQueryError {
    /// Invalid URL query param, for example `"name=value=value"`: it
    /// contains an unescaped `=` character.
    #[error("invalid param {raw_param} in {location}")]
    InvalidParam {
        location: &'static Location<'static>,
        raw_param: String,
    },
}

impl FromStr for Query {
    type Err = ParseQueryError;

    fn from_str(raw_query: &str) -> Result<Self, Self::Err> {
        let mut params: MultiMap<ParamName, NameValuePair> = MultiMap::new();

        let trimmed = raw_query.trim().trim_start_matches('?');
        if trimmed.is_empty() {
            return Ok(Self { params });
        }

        for raw_param in trimmed.split('&') {
            let pair: NameValuePair = raw_param.parse()?;
            let param_name = pair.name.clone();
            params.insert(param_name, pair);
        }

        Ok(Self { params })
    }
}

impl From<Vec<(&str, &str)>> for Query {
    fn from(raw_params: Vec<(&str, &str)>) -> Self {
        let mut params: MultiMap<ParamName, NameValuePair> = MultiMap::new();

        for (name, value) in raw_params {
            params.insert(name.to_owned(), NameValuePair::new(name, value));
        }

        Self { params }
    }
}

#[derive(Debug, PartialEq, Clone)]
struct NameValuePair {
    name: ParamName,
    value: ParamValue,
}

impl NameValuePair {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }
}

impl FromStr for NameValuePair {
    type Err = ParseQueryError;

    fn from_str(raw_param: &str) -> Result<Self, Self::Err> {
        let pair: Vec<&str> = raw_param.split('=').collect();

        match pair.len() {
            1 => Ok(Self::new(pair[0], "")),
            2 => Ok(Self::new(pair[0], pair[1])),
            _ => Err(ParseQueryError::InvalidParam {
                location: Location::caller(),
                raw_param: raw_param.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Query;

    #[test]
    fn it_should_parse_a_query_with_single_and_repeated_params() {
        let query = "param1=value1&param2=value2&param2=value3".parse::<Query>().unwrap();

        assert_eq!(query.get_param("param1").unwrap(), "value1");
        assert_eq!(
            query.get_param_vec("param2"),
            Some(vec!["value2".to_string(), "value3".to_string()])
        );
    }

    #[test]
    fn it_should_return_only_the_first_value_for_repeated_params() {
        let query = "param1=value1&param1=value2".parse::<Query>().unwrap();

        assert_eq!(query.get_param("param1").unwrap(), "value1");
    }

    #[test]
    fn it_should_accept_a_param_without_a_value() {
        let query = "report_w_bad".parse::<Query>().unwrap();

        assert_eq!(query.get_param("report_w_bad").unwrap(), "");
    }

    #[test]
    fn it_should_reject_a_param_with_an_unescaped_equals_sign() {
        assert!("param1=value1=value2".parse::<Query>().is_err());
    }

    #[test]
    fn an_empty_query_has_no_params() {
        let query = "".parse::<Query>().unwrap();

        assert!(query.is_empty());
        assert_eq!(query.get_param("anything"), None);
    }

    #[test]
    fn a_leading_question_mark_is_ignored() {
        let query = "?param1=value1".parse::<Query>().unwrap();

        assert_eq!(query.get_param("param1").unwrap(), "value1");
    }
}
