use crate::fs::inode::InodeId;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("missing argument `{0}`")]
    Missing(&'static str),
    #[error("argument `{0}` is not a valid number")]
    BadNumber(&'static str),
    #[error("argument `{0}` is not valid UTF-8")]
    BadEncoding(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupArgs {
    pub parent_id: InodeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetattrArgs {
    pub id: InodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateArgs {
    pub parent_id: InodeId,
    pub name: String,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkArgs {
    pub parent_id: InodeId,
    pub name: String,
    pub target_id: InodeId,
}

/// Shared by `unlink` and `rmdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveArgs {
    pub parent_id: InodeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadArgs {
    pub id: InodeId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteArgs {
    pub id: InodeId,
    pub offset: u64,
    pub buf: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterateArgs {
    pub id: InodeId,
    pub offset: u64,
}

/// A decoded request. Each variant carries exactly the arguments its
/// operation reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Lookup(LookupArgs),
    Getattr(GetattrArgs),
    Create(CreateArgs),
    Link(LinkArgs),
    Unlink(RemoveArgs),
    Rmdir(RemoveArgs),
    Read(ReadArgs),
    Write(WriteArgs),
    Iterate(IterateArgs),
}

/// Raw request arguments. Values are kept percent-encoded and decoded once
/// when an operation reads them.
struct RawArgs<'a>(&'a HashMap<String, String>);

impl RawArgs<'_> {
    fn raw(&self, key: &'static str) -> Result<&str, ArgError> {
        self.0.get(key).map(String::as_str).ok_or(ArgError::Missing(key))
    }

    fn bytes(&self, key: &'static str) -> Result<Vec<u8>, ArgError> {
        Ok(percent_decode_str(self.raw(key)?).collect())
    }

    fn string(&self, key: &'static str) -> Result<String, ArgError> {
        percent_decode_str(self.raw(key)?)
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|_| ArgError::BadEncoding(key))
    }

    fn number<T: FromStr>(&self, key: &'static str) -> Result<T, ArgError> {
        self.string(key)?
            .trim()
            .parse()
            .map_err(|_| ArgError::BadNumber(key))
    }
}

impl Operation {
    pub fn parse(name: &str, args: &HashMap<String, String>) -> Result<Self, ArgError> {
        let args = RawArgs(args);
        let op = match name {
            "lookup" => Operation::Lookup(LookupArgs {
                parent_id: args.number("parent_id")?,
                name: args.string("name")?,
            }),
            "getattr" => Operation::Getattr(GetattrArgs {
                id: args.number("id")?,
            }),
            "create" => Operation::Create(CreateArgs {
                parent_id: args.number("parent_id")?,
                name: args.string("name")?,
                mode: args.number("mode")?,
            }),
            "link" => Operation::Link(LinkArgs {
                parent_id: args.number("parent_id")?,
                name: args.string("name")?,
                target_id: args.number("target_id")?,
            }),
            "unlink" => Operation::Unlink(RemoveArgs {
                parent_id: args.number("parent_id")?,
                name: args.string("name")?,
            }),
            "rmdir" => Operation::Rmdir(RemoveArgs {
                parent_id: args.number("parent_id")?,
                name: args.string("name")?,
            }),
            "read" => Operation::Read(ReadArgs {
                id: args.number("id")?,
                offset: args.number("offset")?,
                size: args.number("size")?,
            }),
            "write" => Operation::Write(WriteArgs {
                id: args.number("id")?,
                offset: args.number("offset")?,
                buf: args.bytes("buf")?,
            }),
            "iterate" => Operation::Iterate(IterateArgs {
                id: args.number("id")?,
                offset: args.number("offset")?,
            }),
            other => return Err(ArgError::UnknownOperation(other.to_string())),
        };
        Ok(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Lookup(_) => "lookup",
            Operation::Getattr(_) => "getattr",
            Operation::Create(_) => "create",
            Operation::Link(_) => "link",
            Operation::Unlink(_) => "unlink",
            Operation::Rmdir(_) => "rmdir",
            Operation::Read(_) => "read",
            Operation::Write(_) => "write",
            Operation::Iterate(_) => "iterate",
        }
    }
}
