use extend::ext;
use fancy_regex::Regex;

#[ext(pub(crate), name = StrTokenExt)]
impl str {
    /// Every match of `pattern`, in order.
    fn regex_tokens(&self, pattern: &Regex) -> Result<Vec<String>, fancy_regex::Error> {
        pattern
            .find_iter(self)
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect()
    }

    fn whitespace_tokens(&self) -> Vec<String> {
        self.split_whitespace().map(str::to_string).collect()
    }
}
