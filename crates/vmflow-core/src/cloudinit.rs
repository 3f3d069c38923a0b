//! cloud-init ドキュメント生成
//!
//! Tera で user-data を展開し、meta-data / network-config と合わせて
//! ISO に詰める3ファイル分の内容を作ります。

use crate::error::{CoreError, Result};
use crate::model::{DeploymentConfig, VmIdentity};
use tera::{Context, Tera};
use tracing::debug;

/// user-data テンプレート
///
/// `datasource_list` はシステム設定側の項目なので user-data には書かない。
pub const USER_DATA_TEMPLATE: &str = r#"#cloud-config

users:
  - name: {{ user }}
    sudo: ALL=(ALL) NOPASSWD:ALL
    shell: /bin/bash
    lock_passwd: false
    plain_text_passwd: {{ user }}
{%- if ssh_key %}
    ssh_authorized_keys:
      - {{ ssh_key }}
{%- endif %}

ssh_pwauth: true
disable_root: false
chpasswd:
  expire: false
  users:
    - name: {{ user }}
      password: {{ user }}
      type: text

hostname: {{ hostname }}
fqdn: {{ hostname }}.local
preserve_hostname: false
manage_etc_hosts: true

write_files:
  - path: /etc/netplan/50-cloud-init.yaml
    permissions: '0600'
    owner: root:root
    content: |
      network:
        version: 2
        ethernets:
          ens160:
            dhcp4: true
            dhcp4-overrides:
              use-hostname: false
          ens192:
            dhcp4: true
            dhcp4-overrides:
              use-hostname: false
  - path: /home/{{ user }}/install-docker.sh
    permissions: '0755'
    owner: root:root
    content: |
      #!/bin/bash
      set -e
      apt-get update
      apt-get install -y ca-certificates curl gnupg lsb-release
      mkdir -p /etc/apt/keyrings
      curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor -o /etc/apt/keyrings/docker.gpg
      chmod a+r /etc/apt/keyrings/docker.gpg
      echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable" > /etc/apt/sources.list.d/docker.list
      apt-get update
      apt-get install -y docker-ce docker-ce-cli containerd.io docker-buildx-plugin docker-compose-plugin
      systemctl enable docker
      systemctl start docker
      usermod -aG docker {{ user }}

packages:
  - curl
  - wget
  - git
  - vim
  - htop
  - nmap
  - netcat-traditional
  - tcpdump
  - python3
  - python3-pip
  - net-tools
  - dnsutils
  - apt-transport-https
  - ca-certificates
  - gnupg
  - lsb-release
  - cloud-guest-utils

growpart:
  mode: auto
  devices: ['/']

runcmd:
  - chmod 600 /etc/netplan/50-cloud-init.yaml
  - hostnamectl set-hostname {{ hostname }}
  - echo "{{ hostname }}" > /etc/hostname
  - sed -i 's/127.0.1.1.*/127.0.1.1 {{ hostname }}.local {{ hostname }}/' /etc/hosts
  - sed -i 's/^#\?PasswordAuthentication.*/PasswordAuthentication yes/' /etc/ssh/sshd_config
  - systemctl restart ssh || systemctl restart sshd
  - netplan generate
  - netplan apply
  - sleep 10
  - /home/{{ user }}/install-docker.sh
  - |
    cd /tmp
    wget -q https://golang.org/dl/go{{ go_version }}.linux-amd64.tar.gz
    tar -xzf go{{ go_version }}.linux-amd64.tar.gz -C /usr/local
    rm go{{ go_version }}.linux-amd64.tar.gz
  - echo 'export PATH=$PATH:/usr/local/go/bin' >> /etc/profile
  - echo 'export PATH=$PATH:/usr/local/go/bin' >> /home/{{ user }}/.bashrc
  - mkdir -p /home/{{ user }}/go/bin /home/{{ user }}/go/src /home/{{ user }}/go/pkg
  - echo 'export GOPATH=/home/{{ user }}/go' >> /home/{{ user }}/.bashrc
  - chown -R {{ user }}:{{ user }} /home/{{ user }}/go

final_message: "cloud-init finished after $UPTIME seconds"
"#;

/// DHCP を強制する network-config
pub const NETWORK_CONFIG: &str = "version: 2
ethernets:
  ens160:
    dhcp4: true
  ens192:
    dhcp4: true
";

/// ISO に詰める3ファイルの内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudInitDocument {
    pub user_data: String,
    pub meta_data: String,
    pub network_config: String,
}

impl CloudInitDocument {
    /// 標準テンプレートでドキュメントを生成
    ///
    /// `ssh_key` は公開鍵ファイルの内容。`None` の場合はパスワード認証のみ。
    pub fn render(
        config: &DeploymentConfig,
        vm: &VmIdentity,
        ssh_key: Option<&str>,
    ) -> Result<Self> {
        Self::render_with(USER_DATA_TEMPLATE, config, vm, ssh_key)
    }

    /// 任意のテンプレートでドキュメントを生成
    pub fn render_with(
        template: &str,
        config: &DeploymentConfig,
        vm: &VmIdentity,
        ssh_key: Option<&str>,
    ) -> Result<Self> {
        let user_data = render_user_data(
            template,
            &vm.hostname,
            &config.guest.user,
            &config.go_version,
            ssh_key,
        )?;
        debug!(vm = %vm.name, bytes = user_data.len(), "Rendered user-data");

        Ok(Self {
            user_data,
            meta_data: meta_data(&vm.name, &vm.hostname),
            network_config: NETWORK_CONFIG.to_string(),
        })
    }
}

/// user-data テンプレートを展開
pub fn render_user_data(
    template: &str,
    hostname: &str,
    user: &str,
    go_version: &str,
    ssh_key: Option<&str>,
) -> Result<String> {
    let mut context = Context::new();
    context.insert("hostname", hostname);
    context.insert("user", user);
    context.insert("go_version", go_version);
    context.insert("ssh_key", &ssh_key.map(str::trim).filter(|k| !k.is_empty()));

    Tera::one_off(template, &context, false).map_err(|e| {
        // Tera のエラーは原因が source に入っている
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        CoreError::TemplateRender(message)
    })
}

/// meta-data を生成（instance-id はVM名）
pub fn meta_data(instance_id: &str, hostname: &str) -> String {
    format!("instance-id: {instance_id}\nlocal-hostname: {hostname}\n")
}
