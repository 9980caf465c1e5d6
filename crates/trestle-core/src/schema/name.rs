use heck::{ToSnakeCase, ToUpperCamelCase};

/// An entity or relation name, split into words so it can be rendered in
/// the casing each context expects.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Name {
    pub parts: Vec<String>,
}

impl Name {
    pub fn new(src: &str) -> Self {
        let snake = src.to_snake_case();
        let parts = snake.split('_').map(String::from).collect();
        Self { parts }
    }

    pub fn upper_camel_case(&self) -> String {
        self.snake_case().to_upper_camel_case()
    }

    pub fn snake_case(&self) -> String {
        self.parts.join("_")
    }
}

impl core::fmt::Display for Name {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.upper_camel_case())
    }
}
