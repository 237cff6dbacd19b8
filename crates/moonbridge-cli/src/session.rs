//! Engine setup shared by the commands.

use crate::config::CliConfig;
use moonbridge_engine::{Libraries, LuaRef, LuaResult, LuaState, LuaTable, StateOptions};

/// Globals copied into a sandbox environment when the state provides them
pub const SANDBOX_GLOBALS: &[&str] = &[
    "_VERSION", "assert", "error", "ipairs", "next", "pairs", "pcall", "print", "select",
    "tonumber", "tostring", "type", "xpcall", "math", "string", "table", "utf8",
];

/// Command-line values layered over the configuration file
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub sandbox: bool,
    pub no_std: bool,
    pub traceback: bool,
}

/// A configured VM plus the environment scripts should run in
pub struct Session {
    pub state: LuaState,
    pub sandbox: bool,
}

impl Session {
    pub fn open(config: &CliConfig, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut options: StateOptions = config.state_options()?;
        if overrides.no_std {
            options.libraries = Libraries::None;
        }
        options.traceback |= overrides.traceback;

        let state = LuaState::with_options(options)?;
        let sandbox = config.state.sandbox || overrides.sandbox;
        tracing::debug!(sandbox, "session opened");
        Ok(Self { state, sandbox })
    }

    /// The sandbox table when sandboxing, `None` for plain globals.
    pub fn environment(&self) -> LuaResult<Option<LuaTable<'_>>> {
        if !self.sandbox {
            return Ok(None);
        }
        let env = self.state.new_table()?;
        let globals = self.state.globals()?;
        for &name in SANDBOX_GLOBALS {
            let value: LuaRef<'_> = globals.raw_get(name)?;
            if value.is_nil() {
                continue;
            }
            match value.clone().into_table() {
                // Library tables are copied so the script cannot patch the host's
                Ok(library) => env.raw_set(name, self.shallow_copy(&library)?)?,
                Err(_) => env.raw_set(name, &value)?,
            }
        }
        Ok(Some(env))
    }

    fn shallow_copy<'lua>(&'lua self, table: &LuaTable<'lua>) -> LuaResult<LuaTable<'lua>> {
        let entries = table.pairs()?;
        let copy = self.state.new_table_with(0, entries.len())?;
        for (key, value) in &entries {
            copy.raw_set(key, value)?;
        }
        Ok(copy)
    }

    /// Render a value the way `tostring` does, falling back to the type
    /// name when `tostring` is unavailable.
    pub fn display(&self, value: &LuaRef<'_>) -> String {
        let tostring = match self.state.global("tostring") {
            Ok(key) => key,
            Err(_) => return format!("<{}>", value.type_name()),
        };
        if tostring.is_nil() {
            return value
                .get::<String>()
                .unwrap_or_else(|_| format!("<{}>", value.type_name()));
        }
        tostring
            .call(value)
            .ok()
            .and_then(|out| out.first().and_then(|s| s.get::<String>().ok()))
            .unwrap_or_else(|| format!("<{}>", value.type_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_environment_whitelist() {
        let config = CliConfig::default();
        let session = Session::open(
            &config,
            &Overrides {
                sandbox: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        let env = session.environment().unwrap().unwrap();

        assert!(!env.raw_get::<_, LuaRef<'_>>("print").unwrap().is_nil());
        assert!(!env.raw_get::<_, LuaRef<'_>>("string").unwrap().is_nil());
        assert!(env.raw_get::<_, LuaRef<'_>>("os").unwrap().is_nil());
        assert!(env.raw_get::<_, LuaRef<'_>>("require").unwrap().is_nil());
    }

    #[test]
    fn test_sandbox_cannot_patch_host_libraries() {
        let session = Session::open(
            &CliConfig::default(),
            &Overrides {
                sandbox: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        let env = session.environment().unwrap().unwrap();
        let state = &session.state;

        assert!(state.do_string_in(
            "string.format = function() return 'patched' end \
             table.insert = nil \
             math.pi = 3",
            &env
        ));
        // The sandbox sees its own edits
        assert_eq!(
            state
                .eval_in("return string.format('%d', 1)", &env)
                .unwrap()[0]
                .get::<String>()
                .unwrap(),
            "patched"
        );
        // The host does not
        assert_eq!(
            state.eval("return string.format('%d', 1)").unwrap()[0]
                .get::<String>()
                .unwrap(),
            "1"
        );
        assert!(state.do_string("assert(table.insert and math.pi > 3.14)"));
    }

    #[test]
    fn test_plain_session_has_no_environment() {
        let session = Session::open(&CliConfig::default(), &Overrides::default()).unwrap();
        assert!(session.environment().unwrap().is_none());
    }

    #[test]
    fn test_config_sandbox_applies() {
        let config = CliConfig::parse("[state]\nsandbox = true").unwrap();
        let session = Session::open(&config, &Overrides::default()).unwrap();
        assert!(session.sandbox);
    }

    #[test]
    fn test_no_std_override() {
        let session = Session::open(
            &CliConfig::default(),
            &Overrides {
                no_std: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        assert!(session.state.global("print").unwrap().is_nil());
    }

    #[test]
    fn test_display() {
        let session = Session::open(&CliConfig::default(), &Overrides::default()).unwrap();
        let values = session.state.eval("return 1, 'two', nil, true").unwrap();
        let shown: Vec<String> = values.iter().map(|v| session.display(v)).collect();
        assert_eq!(shown, ["1", "two", "nil", "true"]);

        let bare = Session::open(
            &CliConfig::default(),
            &Overrides {
                no_std: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        let values = bare.state.eval("return 3, {}").unwrap();
        assert_eq!(bare.display(&values[0]), "3");
        assert_eq!(bare.display(&values[1]), "<table>");
    }
}
