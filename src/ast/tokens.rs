#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier, keyword or path component: letters, digits and `_`
    ///
    /// # Examples
    /// ```text
    /// title
    /// mod
    /// starts_with
    /// ```
    Word(String),

    /// Integer or decimal literal
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// ```
    Number(String),

    /// `$` on its own or followed by an identifier
    ///
    /// # Examples
    /// ```text
    /// $
    /// $count
    /// $myfunc
    /// ```
    Dollar(String),

    /// Quoted string, raw text including the quotes (`"`, `'` or a backtick)
    Quoted(String),

    /// One of the single character punctuators `()[]{};,.#?!:$`
    Punct(char),

    /// `..`
    Range,

    /// Maximal run of other symbol characters
    ///
    /// # Examples
    /// ```text
    /// ->
    /// >=
    /// ||
    /// <<
    /// **
    /// ```
    Symbol(String),

    /// End of input
    Eof,
}

impl Token {
    pub fn text(&self) -> String {
        match self {
            Token::Word(t)
            | Token::Number(t)
            | Token::Dollar(t)
            | Token::Quoted(t)
            | Token::Symbol(t) => t.clone(),
            Token::Punct(c) => c.to_string(),
            Token::Range => "..".to_string(),
            Token::Eof => String::new(),
        }
    }

    /// Compares against the token text without allocating.
    pub fn is(&self, s: &str) -> bool {
        match self {
            Token::Word(t)
            | Token::Number(t)
            | Token::Dollar(t)
            | Token::Quoted(t)
            | Token::Symbol(t) => t == s,
            Token::Punct(c) => {
                let mut chars = s.chars();
                chars.next() == Some(*c) && chars.next().is_none()
            }
            Token::Range => s == "..",
            Token::Eof => s.is_empty(),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Token::Eof)
    }

    pub fn quote(&self) -> Option<char> {
        match self {
            Token::Quoted(t) => t.chars().next(),
            _ => None,
        }
    }

    /// String content of a quoted token. `\"` inside double quotes is
    /// unescaped; the other quote styles have no escapes.
    pub fn unquoted(&self) -> Option<String> {
        let Token::Quoted(raw) = self else {
            return None;
        };
        let quote = raw.chars().next()?;
        let inner = raw.strip_prefix(quote)?;
        let inner = inner.strip_suffix(quote).unwrap_or(inner);
        if quote == '"' {
            Some(inner.replace("\\\"", "\""))
        } else {
            Some(inner.to_string())
        }
    }
}
