#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands that switch the current screen. The action carries the target view name.
pub(crate) const VIEW_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "chat",
        action: "chat",
    },
    CommandSpec {
        command: "vibecoding",
        action: "vibecoding",
    },
    CommandSpec {
        command: "code",
        action: "vibecoding",
    },
    CommandSpec {
        command: "imagine",
        action: "image_gen",
    },
    CommandSpec {
        command: "image",
        action: "image_gen",
    },
    CommandSpec {
        command: "edit",
        action: "image_edit",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "attach",
        action: "attach",
    },
    CommandSpec {
        command: "source",
        action: "set_source",
    },
];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "instruction",
    action: "set_instruction",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "detach",
        action: "detach",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "views",
        action: "views",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "login",
        action: "login",
    },
    CommandSpec {
        command: "logout",
        action: "logout",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/login",
    "/logout",
    "/chat",
    "/vibecoding",
    "/imagine",
    "/edit",
    "/attach",
    "/detach",
    "/source",
    "/instruction",
    "/reset",
    "/views",
    "/help",
    "/quit",
];
