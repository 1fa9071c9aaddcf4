use crate::ast::Token;

const SINGLE_CHAR: &str = "()[]{};,.#?!:$";

/// On-demand tokenizer. Nothing is buffered: `peek` rescans from the
/// current position, so the parser can look ahead and backtrack by saving
/// and restoring `position`.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\'' || c == '`'
}

fn is_number(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_digit() || c == '.')
        && text.chars().filter(|c| *c == '.').count() <= 1
        && text.parse::<f64>().is_ok()
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer {
            input: input.chars().collect(),
            position: 0,
        };
        lexer.position = lexer.skip_whitespace(0);
        lexer
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.input.len());
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    pub fn input(&self) -> String {
        self.input.iter().collect()
    }

    /// Text between two character offsets.
    pub fn slice(&self, from: usize, to: usize) -> String {
        let to = to.min(self.input.len());
        let from = from.min(to);
        self.input[from..to].iter().collect()
    }

    /// Next token without consuming it.
    pub fn peek(&self) -> Token {
        self.scan().0
    }

    /// Next token; consumes it and the whitespace after it.
    pub fn next_token(&mut self) -> Token {
        let (token, end) = self.scan();
        self.position = self.skip_whitespace(end);
        token
    }

    fn char_at(&self, i: usize) -> Option<char> {
        self.input.get(i).copied()
    }

    fn skip_whitespace(&self, mut i: usize) -> usize {
        while self.char_at(i).is_some_and(char::is_whitespace) {
            i += 1;
        }
        i
    }

    fn run_while(&self, mut i: usize, pred: impl Fn(char) -> bool) -> usize {
        while self.char_at(i).is_some_and(&pred) {
            i += 1;
        }
        i
    }

    fn scan(&self) -> (Token, usize) {
        let start = self.position;
        let Some(c) = self.char_at(start) else {
            return (Token::Eof, start);
        };

        if c.is_ascii_digit() {
            let mut end = self.run_while(start, |c| c.is_ascii_digit() || c == '.');
            if self.char_at(end).is_some_and(is_word_char) {
                end = self.run_while(end, is_word_char);
            }
            let text = self.slice(start, end);
            if is_number(&text) {
                return (Token::Number(text), end);
            }
            return (Token::Word(text), end);
        }

        if is_word_char(c) {
            let end = self.run_while(start, is_word_char);
            return (Token::Word(self.slice(start, end)), end);
        }

        if c == '$' {
            let end = self.run_while(start + 1, is_word_char);
            return (Token::Dollar(self.slice(start, end)), end);
        }

        if c == '"' {
            let mut end = start + 1;
            while let Some(ch) = self.char_at(end) {
                if ch == '"' && self.char_at(end - 1) != Some('\\') {
                    break;
                }
                end += 1;
            }
            let end = (end + 1).min(self.input.len());
            return (Token::Quoted(self.slice(start, end)), end);
        }

        if is_quote(c) {
            let close = self.run_while(start + 1, |ch| ch != c);
            let end = (close + 1).min(self.input.len());
            return (Token::Quoted(self.slice(start, end)), end);
        }

        if SINGLE_CHAR.contains(c) {
            if c == '.' && self.char_at(start + 1) == Some('.') {
                return (Token::Range, start + 2);
            }
            return (Token::Punct(c), start + 1);
        }

        let end = self.run_while(start, |ch| {
            !ch.is_whitespace() && !is_word_char(ch) && !is_quote(ch) && !SINGLE_CHAR.contains(ch)
        });
        (Token::Symbol(self.slice(start, end)), end)
    }
}
